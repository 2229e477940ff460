use log::{debug, error, warn};

use crate::err::{CmdErrorKind, SdError};
use crate::platform::{Platform, RegisterIo};

use super::{SdhciHost, adma::AdmaTable, config::AutoCmd, constant::*};

/// Command type field of the command register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CmdType {
    #[default]
    Normal = 0,
    Suspend = 1,
    Resume = 2,
    Abort = 3,
}

/// Caller memory moved by DMA; the variant gives the direction.
#[derive(Debug)]
pub enum DataBuffer<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

impl DataBuffer<'_> {
    fn addr(&self) -> usize {
        match self {
            DataBuffer::Read(buf) => buf.as_ptr() as usize,
            DataBuffer::Write(buf) => buf.as_ptr() as usize,
        }
    }

    fn len(&self) -> usize {
        match self {
            DataBuffer::Read(buf) => buf.len(),
            DataBuffer::Write(buf) => buf.len(),
        }
    }

    fn is_read(&self) -> bool {
        matches!(self, DataBuffer::Read(_))
    }
}

#[derive(Debug)]
pub struct MmcData<'a> {
    pub buffer: DataBuffer<'a>,
    /// Number of 512-byte blocks
    pub num_blocks: u32,
}

impl MmcData<'_> {
    fn byte_len(&self) -> u32 {
        self.num_blocks * SDHCI_MMC_BLK_SZ
    }

    fn check(&self) {
        assert!(
            self.num_blocks > 0 && self.num_blocks <= u16::MAX as u32,
            "invalid block count {}",
            self.num_blocks
        );
        assert!(
            self.buffer.len() >= self.byte_len() as usize,
            "buffer of {} bytes too small for {} blocks",
            self.buffer.len(),
            self.num_blocks
        );
        assert!(
            self.buffer.addr() % SDHCI_ADMA_ADDR_ALIGN == 0,
            "buffer {:#x} is not 4-byte aligned",
            self.buffer.addr()
        );

        // Written-back lines would clobber DMA data in a shared cache line.
        // Write buffers are flushed by the caller.
        if self.buffer.is_read() {
            assert!(
                self.buffer.addr() % SDHCI_CACHE_LINE_SIZE == 0,
                "read buffer {:#x} is not cache line aligned",
                self.buffer.addr()
            );
        }
    }
}

#[derive(Debug)]
pub struct MmcCommand<'a> {
    pub opcode: u8,
    pub arg: u32,
    pub resp_type: u32,
    pub cmd_type: CmdType,
    pub data: Option<MmcData<'a>>,
    /// Response, filled in by [`SdhciHost::send_command`]
    pub resp: [u32; 4],
}

impl<'a> MmcCommand<'a> {
    pub fn new(opcode: u8, arg: u32, resp_type: u32) -> Self {
        Self {
            opcode,
            arg,
            resp_type,
            cmd_type: CmdType::Normal,
            data: None,
            resp: [0; 4],
        }
    }

    pub fn with_cmd_type(mut self, cmd_type: CmdType) -> Self {
        self.cmd_type = cmd_type;
        self
    }

    pub fn with_read(mut self, buffer: &'a mut [u8], num_blocks: u32) -> Self {
        self.data = Some(MmcData {
            buffer: DataBuffer::Read(buffer),
            num_blocks,
        });
        self
    }

    pub fn with_write(mut self, buffer: &'a [u8], num_blocks: u32) -> Self {
        self.data = Some(MmcData {
            buffer: DataBuffer::Write(buffer),
            num_blocks,
        });
        self
    }

    pub fn data_present(&self) -> bool {
        self.data.is_some()
    }
}

/// Progress of one command through the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdState {
    Idle,
    Armed,
    Dispatched,
    AwaitingCommandComplete,
    AwaitingTransferComplete,
    Done,
    Failed,
}

/// Map a response type to the command register's response length.
pub fn response_length(resp_type: u32) -> Result<ResponseLength, SdError> {
    match resp_type {
        MMC_RSP_NONE => Ok(ResponseLength::None),
        // R5, R6 and R7 share R1's flags, R4 shares R3's
        MMC_RSP_R1 | MMC_RSP_R3 => Ok(ResponseLength::Short48),
        MMC_RSP_R1B => Ok(ResponseLength::Short48Busy),
        MMC_RSP_R2 => Ok(ResponseLength::Long136),
        _ => Err(SdError::InvalidResponseType),
    }
}

pub fn make_command(opcode: u8, flags: u16) -> u16 {
    ((opcode as u16) << SDHCI_CMD_INDEX_SHIFT) | (flags & 0xFF)
}

/// Rebuild a 136-bit response from the four response registers.
///
/// The controller drops the CRC byte and stores bits 127:8 of the response
/// in bits 119:0 of the registers, so each word is moved up a byte and picks
/// up the top byte of the word below it.
pub fn assemble_r2(raw: [u32; 4]) -> [u32; 4] {
    let mut resp = [0; 4];
    for i in 0..4 {
        resp[i] = raw[i] << 8;
        if i != 0 {
            resp[i] |= raw[i - 1] >> 24;
        }
    }
    resp
}

const ERROR_PRECEDENCE: [(ErrorIntStatus, CmdErrorKind); 10] = [
    (ErrorIntStatus::CMD_TIMEOUT, CmdErrorKind::CommandTimeout),
    (ErrorIntStatus::CMD_CRC, CmdErrorKind::CommandCrc),
    (ErrorIntStatus::CMD_END_BIT, CmdErrorKind::CommandEndBit),
    (ErrorIntStatus::CMD_INDEX, CmdErrorKind::CommandIndex),
    (ErrorIntStatus::DATA_TIMEOUT, CmdErrorKind::DataTimeout),
    (ErrorIntStatus::DATA_CRC, CmdErrorKind::DataCrc),
    (ErrorIntStatus::DATA_END_BIT, CmdErrorKind::DataEndBit),
    (ErrorIntStatus::CURRENT_LIMIT, CmdErrorKind::CurrentLimit),
    (ErrorIntStatus::AUTO_CMD12, CmdErrorKind::AutoCmd12),
    (ErrorIntStatus::ADMA, CmdErrorKind::Adma),
];

/// First error, in check order, flagged in an error interrupt status value.
pub fn classify_error(status: ErrorIntStatus) -> Option<CmdErrorKind> {
    ERROR_PRECEDENCE
        .iter()
        .find(|(bit, _)| status.contains(*bit))
        .map(|&(_, kind)| kind)
}

impl<R: RegisterIo, P: Platform> SdhciHost<R, P> {
    /// Issue `cmd` and block until it, and its data phase if any, completes.
    ///
    /// The response is written to `cmd.resp`. Data commands always leave
    /// the command and data lines reset, whatever the outcome.
    ///
    /// # Panics
    ///
    /// If the data block count is zero or above 65535, the buffer is shorter
    /// than the transfer or not 4-byte aligned, or a read buffer is not cache
    /// line aligned.
    pub fn send_command(&mut self, cmd: &mut MmcCommand<'_>) -> Result<(), SdError> {
        if let Some(data) = &cmd.data {
            data.check();
        }
        trace(cmd.opcode, CmdState::Idle);

        self.wait_lines_free()?;
        trace(cmd.opcode, CmdState::Armed);

        let resp_len = response_length(cmd.resp_type).inspect_err(|_| {
            error!("Invalid response type {:#x} for CMD{}", cmd.resp_type, cmd.opcode);
        })?;

        let mut flags = resp_len as u16;
        if cmd.data_present() {
            flags |= SDHCI_CMD_DATA_PRESENT;
        }
        flags |= (cmd.cmd_type as u16) << SDHCI_CMD_TYPE_SHIFT;

        self.write_reg8(SDHCI_TIMEOUT_CONTROL, SDHCI_CMD_TIMEOUT);

        // Dropped, and the table freed, on every path out of this function
        let table = cmd.data.as_ref().map(|data| self.adma_transfer(data));

        self.write_reg(SDHCI_ARGUMENT, cmd.arg);
        self.write_reg16(SDHCI_COMMAND, make_command(cmd.opcode, flags));
        trace(cmd.opcode, CmdState::Dispatched);

        let ret = self.cmd_complete(cmd);

        if cmd.data_present() {
            self.reset_lines();
        }

        if ret.is_ok() {
            if let Some(data) = &cmd.data {
                if let DataBuffer::Read(buf) = &data.buffer {
                    self.platform
                        .invalidate_dcache_range(buf.as_ptr() as usize, data.byte_len() as usize);
                }
            }
        }

        drop(table);
        trace(cmd.opcode, if ret.is_ok() { CmdState::Done } else { CmdState::Failed });

        ret
    }

    fn wait_lines_free(&self) -> Result<(), SdError> {
        let busy = PresentState::CMD_INHIBIT | PresentState::DAT_INHIBIT;
        let mut retry = 0;
        while PresentState::from_bits_truncate(self.read_reg(SDHCI_PRESENT_STATE)).intersects(busy) {
            self.platform.delay_us(SDHCI_LINES_FREE_DELAY_US);
            retry += 1;
            if retry == SDHCI_LINES_FREE_RETRY {
                error!("CMD or DAT lines were never freed");
                return Err(SdError::LinesBusy);
            }
        }

        Ok(())
    }

    /// Program block size, count and transfer mode and hand the descriptor
    /// table to the controller.
    fn adma_transfer(&self, data: &MmcData<'_>) -> AdmaTable {
        let num_blks = data.num_blocks;
        let table = self.prep_desc_table(data.buffer.addr(), data.byte_len());

        self.write_reg16(SDHCI_BLOCK_SIZE, SDHCI_MMC_BLK_SZ as u16);

        let mut mode = TransferMode::empty();
        if num_blks > 1 {
            mode |= TransferMode::MULTI_BLOCK | TransferMode::BLK_CNT_EN;
            match self.config.auto_cmd {
                AutoCmd::Cmd12 => mode |= TransferMode::AUTO_CMD12,
                AutoCmd::Cmd23 => {
                    mode |= TransferMode::AUTO_CMD23;
                    self.write_reg(SDHCI_ARGUMENT2, num_blks);
                }
            }
        }

        self.write_reg16(SDHCI_BLOCK_COUNT, num_blks as u16);

        if data.buffer.is_read() {
            mode |= TransferMode::READ;
        }
        mode |= TransferMode::DMA_EN;

        self.write_reg(SDHCI_ADMA_ADDRESS, self.platform.dma_address(table.as_ptr() as usize));
        self.write_reg16(SDHCI_TRANSFER_MODE, mode.bits());

        table
    }

    fn cmd_complete(&self, cmd: &mut MmcCommand<'_>) -> Result<(), SdError> {
        trace(cmd.opcode, CmdState::AwaitingCommandComplete);
        let mut ret = self.wait_int_status(
            NormalIntStatus::CMD_COMPLETE,
            SDHCI_MAX_CMD_RETRY,
            SDHCI_CMD_RETRY_DELAY_US,
        );

        if ret.is_ok() {
            self.read_response(cmd);

            if cmd.data_present() || cmd.opcode == MMC_SWITCH {
                trace(cmd.opcode, CmdState::AwaitingTransferComplete);
                ret = self.wait_int_status(
                    NormalIntStatus::XFER_COMPLETE,
                    SDHCI_MAX_TRANS_RETRY,
                    SDHCI_TRANS_RETRY_DELAY_US,
                );
            }
        }

        // Error status decides the outcome even after a wait gave up
        self.check_error_status()?;

        ret
    }

    /// Poll for `bit` in the normal interrupt status and clear it once seen.
    /// The bit is left alone when the wait gives up.
    fn wait_int_status(&self, bit: NormalIntStatus, retries: u32, delay_us: u32) -> Result<(), SdError> {
        let mut retry = 0;
        while !NormalIntStatus::from_bits_retain(self.read_reg16(SDHCI_NRML_INT_STATUS)).contains(bit) {
            retry += 1;
            self.platform.delay_us(delay_us);
            if retry == retries {
                return Err(if bit == NormalIntStatus::CMD_COMPLETE {
                    error!("Command never completed");
                    SdError::CommandTimeout
                } else {
                    error!("Transfer never completed");
                    SdError::TransferTimeout
                });
            }
        }

        self.write_reg16(SDHCI_NRML_INT_STATUS, bit.bits());

        Ok(())
    }

    fn read_response(&self, cmd: &mut MmcCommand<'_>) {
        if cmd.resp_type == MMC_RSP_R2 {
            let raw = [0, 1, 2, 3].map(|i| self.read_reg(SDHCI_RESPONSE + i * 4));
            cmd.resp = assemble_r2(raw);
        } else {
            cmd.resp[0] = self.read_reg(SDHCI_RESPONSE);
        }
        debug!("CMD{} response: {:#x?}", cmd.opcode, cmd.resp);
    }

    fn check_error_status(&self) -> Result<(), SdError> {
        let status = NormalIntStatus::from_bits_retain(self.read_reg16(SDHCI_NRML_INT_STATUS));
        if !status.contains(NormalIntStatus::ERROR) {
            return Ok(());
        }

        let err = ErrorIntStatus::from_bits_retain(self.read_reg16(SDHCI_ERR_INT_STATUS));
        self.write_reg16(SDHCI_ERR_INT_STATUS, err.bits());

        match classify_error(err) {
            Some(kind) => {
                error!("{}", kind);
                error!("Command completed with errors");
                Err(SdError::Command(kind))
            }
            None => {
                warn!("Unclassified error interrupt status: {:#x}", err.bits());
                Ok(())
            }
        }
    }
}

fn trace(opcode: u8, state: CmdState) {
    debug!("CMD{}: {:?}", opcode, state);
}
