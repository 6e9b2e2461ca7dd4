//! Instrument transport layer
//!
//! The SPD3303X presents two very different faces depending on how it is
//! attached:
//!
//! - As a **USB serial port** (macOS/Windows, or Linux with a USB-serial
//!   adapter): a free-running duplex byte stream. Writes are fire-and-forget
//!   and replies arrive whenever the instrument produces them, so a
//!   continuous background read loop decodes them into lines.
//! - As a **USBTMC character device** (`/dev/usbtmc0` on Linux): strictly
//!   turn-taking. The device produces output only in direct response to a
//!   query write, and an unrelated write before that read would violate the
//!   protocol. Reads are therefore paired with writes and bounded by a fixed
//!   timeout.
//!
//! [`InstrumentHandle`] tags which contract applies; [`detect`] finds the
//! device in the first place.

pub mod detect;
pub mod error;
pub mod handle;
pub mod serial;
pub mod usbtmc;

pub use detect::{classify_path, discover, DetectedDevice, TransportKind};
pub use error::{DetectError, LinkError};
pub use handle::{InstrumentHandle, LinkKind};
pub use serial::{StreamLink, StreamReader, StreamWriter, DEFAULT_BAUD};
pub use usbtmc::UsbTmcLink;
