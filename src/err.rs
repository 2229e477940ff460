// ===== Types and Structures =====

use core::fmt;

/// Error condition reported by the controller in the error interrupt status
/// register. Listed in the order the engine checks them; the first set bit
/// decides the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdErrorKind {
    CommandTimeout,
    CommandCrc,
    CommandEndBit,
    CommandIndex,
    DataTimeout,
    DataCrc,
    DataEndBit,
    CurrentLimit,
    AutoCmd12,
    Adma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdError {
    /// Requested clock is above the controller base clock
    UnsupportedFrequency,
    /// Command or data line active while stopping the clock
    Busy,
    InvalidResponseType,
    InvalidWidth,
    /// Command or data lines never became free before dispatch
    LinesBusy,
    /// Command complete never asserted
    CommandTimeout,
    /// Transfer complete never asserted
    TransferTimeout,
    ResetTimeout,
    ClockTimeout,
    Command(CmdErrorKind),
}

impl fmt::Display for CmdErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmdErrorKind::CommandTimeout => write!(f, "Command timeout error"),
            CmdErrorKind::CommandCrc => write!(f, "Command CRC error"),
            CmdErrorKind::CommandEndBit => write!(f, "CMD end bit error"),
            CmdErrorKind::CommandIndex => write!(f, "Command Index error"),
            CmdErrorKind::DataTimeout => write!(f, "DATA time out error"),
            CmdErrorKind::DataCrc => write!(f, "DATA CRC error"),
            CmdErrorKind::DataEndBit => write!(f, "DATA end bit error"),
            CmdErrorKind::CurrentLimit => write!(f, "Current limit error"),
            CmdErrorKind::AutoCmd12 => write!(f, "Auto CMD12 error"),
            CmdErrorKind::Adma => write!(f, "ADMA error"),
        }
    }
}

impl fmt::Display for SdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdError::UnsupportedFrequency => write!(f, "Requested clock freq is more than supported"),
            SdError::Busy => write!(f, "SDCC command & data line are active"),
            SdError::InvalidResponseType => write!(f, "Invalid response type for the command"),
            SdError::InvalidWidth => write!(f, "Bus width is invalid"),
            SdError::LinesBusy => write!(f, "CMD or DAT lines were never freed"),
            SdError::CommandTimeout => write!(f, "Command never completed"),
            SdError::TransferTimeout => write!(f, "Transfer never completed"),
            SdError::ResetTimeout => write!(f, "Controller reset never completed"),
            SdError::ClockTimeout => write!(f, "Internal clock never stabilised"),
            SdError::Command(kind) => write!(f, "Command completed with errors: {}", kind),
        }
    }
}
