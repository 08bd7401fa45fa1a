//! Dual-bank flash engine: backed by the `esp-ota` crate.
//!
//! Flow: take over the connected socket → send the image GET → parse the
//! response head → stream the body into the inactive partition → verify
//! the length → switch the boot bank → report.
//!
//! The boot bank changes only after the whole image is written and
//! finalized.  Any failure (bad status, short body, write error, deadline)
//! drops the partial update, which leaves the running image untouched.
//!
//! On simulation targets the two banks are in-memory buffers.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Instant;

use core::fmt;

use log::{debug, info, warn};

use crate::app::inputs::{Input, RX_CHUNK};
use crate::app::ports::{Bank, DownloadRequest, FlashError};
use crate::proto::response;

/// Largest image accepted.
pub const MAX_FIRMWARE_SIZE: usize = 4 * 1024 * 1024;

/// Response head must fit here.
const HEAD_CAP: usize = 1024;

/// Reads per poll, to keep the event loop responsive.
const READS_PER_POLL: usize = 8;

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallError {
    BadStatus(u16),
    BadHead,
    TooLarge,
    Empty,
    LengthMismatch { expected: usize, written: usize },
    DeadlineExceeded,
    Io,
    BeginFailed,
    WriteFailed,
    VerifyFailed,
    BootSetFailed,
}

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadStatus(code) => write!(f, "server answered {}", code),
            Self::BadHead => write!(f, "malformed response head"),
            Self::TooLarge => write!(f, "image exceeds 4 MB"),
            Self::Empty => write!(f, "empty image"),
            Self::LengthMismatch { expected, written } => {
                write!(f, "expected {} bytes, got {}", expected, written)
            }
            Self::DeadlineExceeded => write!(f, "download deadline exceeded"),
            Self::Io => write!(f, "socket error"),
            Self::BeginFailed => write!(f, "OTA begin failed"),
            Self::WriteFailed => write!(f, "OTA write failed"),
            Self::VerifyFailed => write!(f, "OTA verification failed"),
            Self::BootSetFailed => write!(f, "set boot partition failed"),
        }
    }
}

// ── Image writer ──────────────────────────────────────────────

/// Sequential writer into the inactive partition.
struct ImageWriter {
    bank: Bank,
    written: usize,
    #[cfg(target_os = "espidf")]
    update: esp_ota::OtaUpdate,
    #[cfg(not(target_os = "espidf"))]
    image: Vec<u8>,
}

impl ImageWriter {
    fn begin(bank: Bank) -> Result<Self, InstallError> {
        #[cfg(target_os = "espidf")]
        {
            let update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("esp-ota begin failed: {:?}", e);
                InstallError::BeginFailed
            })?;
            Ok(Self {
                bank,
                written: 0,
                update,
            })
        }

        #[cfg(not(target_os = "espidf"))]
        Ok(Self {
            bank,
            written: 0,
            image: Vec::new(),
        })
    }

    fn write(&mut self, data: &[u8]) -> Result<(), InstallError> {
        if self.written + data.len() > MAX_FIRMWARE_SIZE {
            return Err(InstallError::TooLarge);
        }

        #[cfg(target_os = "espidf")]
        self.update.write(data).map_err(|e| {
            warn!("esp-ota write failed: {:?}", e);
            InstallError::WriteFailed
        })?;

        #[cfg(not(target_os = "espidf"))]
        self.image.extend_from_slice(data);

        self.written += data.len();
        Ok(())
    }

    /// Verify and make the written bank the next boot bank.
    #[cfg(target_os = "espidf")]
    fn finish(self) -> Result<(), InstallError> {
        let mut completed = self.update.finalize().map_err(|e| {
            warn!("esp-ota finalize failed: {:?}", e);
            InstallError::VerifyFailed
        })?;
        completed.set_as_boot_partition().map_err(|e| {
            warn!("esp-ota set_as_boot_partition failed: {:?}", e);
            InstallError::BootSetFailed
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn finish(self) -> Result<Vec<u8>, InstallError> {
        Ok(self.image)
    }
}

// ── Transfer ──────────────────────────────────────────────────

enum Phase {
    /// Collecting the status line and headers.
    Head(heapless::Vec<u8, HEAD_CAP>),
    /// Streaming the body.
    Body { expected: Option<usize> },
}

struct Transfer {
    stream: TcpStream,
    deadline: Instant,
    phase: Phase,
    writer: ImageWriter,
}

impl Transfer {
    /// Feed received bytes.  Returns `Ok(true)` once `Content-Length` bytes
    /// of body have arrived.
    fn feed(&mut self, data: &[u8]) -> Result<bool, InstallError> {
        match &mut self.phase {
            Phase::Head(head) => {
                head.extend_from_slice(data).map_err(|_| InstallError::BadHead)?;
                let Some(offset) = response::body_offset(head) else {
                    return Ok(false);
                };
                let status = response::parse_status(head).map_err(|_| InstallError::BadHead)?;
                if status != 200 {
                    return Err(InstallError::BadStatus(status));
                }
                // The engine writes the body verbatim, so framing it does
                // not understand must never reach the partition.
                if !response::is_identity_encoded(&head[..offset]) {
                    return Err(InstallError::BadHead);
                }
                let expected = response::content_length(&head[..offset]);
                if expected.is_some_and(|n| n > MAX_FIRMWARE_SIZE) {
                    return Err(InstallError::TooLarge);
                }
                debug!("FLASH | image {:?} bytes", expected);

                let body: heapless::Vec<u8, HEAD_CAP> =
                    heapless::Vec::from_slice(&head[offset..]).map_err(|_| InstallError::BadHead)?;
                self.phase = Phase::Body { expected };
                self.feed(&body)
            }
            Phase::Body { expected } => {
                let expected = *expected;
                self.writer.write(data)?;
                Ok(expected.is_some_and(|n| self.writer.written >= n))
            }
        }
    }

    /// Length check at end of stream.
    fn verify(&self) -> Result<(), InstallError> {
        let written = self.writer.written;
        match self.phase {
            Phase::Head(_) => Err(InstallError::BadHead),
            Phase::Body { .. } if written == 0 => Err(InstallError::Empty),
            Phase::Body {
                expected: Some(expected),
            } if expected != written => Err(InstallError::LengthMismatch { expected, written }),
            Phase::Body { .. } => Ok(()),
        }
    }
}

// ── Engine ────────────────────────────────────────────────────

/// Flash engine for the two application banks.
pub struct OtaFlash {
    transfer: Option<Transfer>,
    /// Bank to boot after the next reboot, once an install succeeded.
    pending_boot: Option<Bank>,
    #[cfg(not(target_os = "espidf"))]
    active: Bank,
    #[cfg(not(target_os = "espidf"))]
    banks: [Vec<u8>; 2],
}

impl Default for OtaFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl OtaFlash {
    pub fn new() -> Self {
        Self {
            transfer: None,
            pending_boot: None,
            #[cfg(not(target_os = "espidf"))]
            active: Bank::User1,
            #[cfg(not(target_os = "espidf"))]
            banks: [Vec::new(), Vec::new()],
        }
    }

    pub fn is_busy(&self) -> bool {
        self.transfer.is_some()
    }

    pub fn pending_boot(&self) -> Option<Bank> {
        self.pending_boot
    }

    /// Bank that is running now.
    #[cfg(target_os = "espidf")]
    pub fn active_bank(&self) -> Bank {
        self.inactive_bank().other()
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn active_bank(&self) -> Bank {
        self.active
    }

    /// Bank the engine may overwrite.
    #[cfg(target_os = "espidf")]
    pub fn inactive_bank(&self) -> Bank {
        use esp_idf_svc::sys::{
            esp_ota_get_next_update_partition, esp_partition_subtype_t_ESP_PARTITION_SUBTYPE_APP_OTA_0,
        };
        // SAFETY: read-only lookup in the static partition table.
        let part = unsafe { esp_ota_get_next_update_partition(core::ptr::null()) };
        if part.is_null() {
            warn!("FLASH | no OTA partition, assuming user2");
            return Bank::User2;
        }
        if unsafe { (*part).subtype } == esp_partition_subtype_t_ESP_PARTITION_SUBTYPE_APP_OTA_0 {
            Bank::User1
        } else {
            Bank::User2
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn inactive_bank(&self) -> Bank {
        self.active.other()
    }

    /// Contents of `bank` (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn bank_image(&self, bank: Bank) -> &[u8] {
        &self.banks[bank_index(bank)]
    }

    /// Start the job on `stream`, which must be connected to `job.server`.
    pub fn start(&mut self, mut stream: TcpStream, job: &DownloadRequest) -> Result<(), FlashError> {
        if self.transfer.is_some() {
            return Err(FlashError::Busy);
        }
        if job.bank != self.inactive_bank() {
            warn!("FLASH | refusing to write running bank {:?}", job.bank);
            return Err(FlashError::NoPartition);
        }
        let writer = ImageWriter::begin(job.bank).map_err(|e| {
            warn!("FLASH | {}", e);
            FlashError::NoPartition
        })?;

        let sent = stream
            .set_nonblocking(false)
            .and_then(|()| stream.write_all(job.request.as_bytes()))
            .and_then(|()| stream.set_nonblocking(true));
        if let Err(e) = sent {
            warn!("FLASH | request send failed: {}", e);
            return Err(FlashError::NoConnection);
        }

        info!(
            "FLASH | downloading {} into {:?} (budget {:?})",
            job.bank.image_name(),
            job.bank,
            job.timeout
        );
        self.pending_boot = None;
        self.transfer = Some(Transfer {
            stream,
            deadline: Instant::now() + job.timeout,
            phase: Phase::Head(heapless::Vec::new()),
            writer,
        });
        Ok(())
    }

    /// Advance the running transfer.  Returns the completion once.
    pub fn poll(&mut self) -> Option<Input> {
        let transfer = self.transfer.as_mut()?;
        let result = Self::pump(transfer, Instant::now());
        let done = result?;
        let transfer = self.transfer.take()?;
        let success = match done.and_then(|()| self.commit(transfer)) {
            Ok(bank) => {
                info!("FLASH | {:?} verified, boot bank switched", bank);
                self.pending_boot = Some(bank);
                true
            }
            Err(e) => {
                warn!("FLASH | install failed: {}", e);
                false
            }
        };
        Some(Input::FlashDone { success })
    }

    /// Restart into the freshly written bank.
    #[cfg(target_os = "espidf")]
    pub fn reboot(&mut self) -> ! {
        info!("FLASH | rebooting into new firmware");
        esp_ota::restart();
    }

    /// Simulated restart: the pending bank becomes the running one.
    #[cfg(not(target_os = "espidf"))]
    pub fn reboot(&mut self) {
        if let Some(bank) = self.pending_boot.take() {
            self.active = bank;
        }
        info!("FLASH | simulated reboot, running {:?}", self.active);
    }

    /// Read what is available.  `None` while the transfer continues.
    fn pump(t: &mut Transfer, now: Instant) -> Option<Result<(), InstallError>> {
        if now >= t.deadline {
            return Some(Err(InstallError::DeadlineExceeded));
        }
        let mut buf = [0u8; RX_CHUNK];
        for _ in 0..READS_PER_POLL {
            match t.stream.read(&mut buf) {
                Ok(0) => return Some(t.verify()),
                Ok(n) => match t.feed(&buf[..n]) {
                    Ok(true) => return Some(t.verify()),
                    Ok(false) => {}
                    Err(e) => return Some(Err(e)),
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock => return None,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("FLASH | read: {}", e);
                    return Some(Err(InstallError::Io));
                }
            }
        }
        None
    }

    #[cfg(target_os = "espidf")]
    fn commit(&mut self, transfer: Transfer) -> Result<Bank, InstallError> {
        let bank = transfer.writer.bank;
        transfer.writer.finish()?;
        Ok(bank)
    }

    #[cfg(not(target_os = "espidf"))]
    fn commit(&mut self, transfer: Transfer) -> Result<Bank, InstallError> {
        let bank = transfer.writer.bank;
        self.banks[bank_index(bank)] = transfer.writer.finish()?;
        Ok(bank)
    }
}

#[cfg(not(target_os = "espidf"))]
fn bank_index(bank: Bank) -> usize {
    match bank {
        Bank::User1 => 0,
        Bank::User2 => 1,
    }
}

// ── Boot validation ───────────────────────────────────────────

/// Mark the running image valid so the bootloader does not roll back.
#[cfg(target_os = "espidf")]
pub fn check_rollback() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("FLASH | firmware marked valid (rollback cancelled)"),
        Err(e) => warn!("FLASH | mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn check_rollback() {
    info!("FLASH | rollback check (simulation): skipped");
}

// ── Tests ─────────────────────────────────────────────────────
