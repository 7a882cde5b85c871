//! # udt-transport
//!
//! Reliable sender side of the UDT protocol over UDP.
//!
//! Application data is stamped with monotonically increasing sequence
//! numbers, queued in a bounded ingress queue and transmitted by a dedicated
//! worker thread while the number of unacknowledged packets stays below the
//! peer's flow window. Transmitted packets stay in the send buffer until an
//! ACK covers them; NAKs and EXP timeouts schedule retransmissions through the
//! sender loss list.
//!
//! ## Crate structure
//!
//! - [`wire`]: UDT data and control packet codec
//! - [`seq`]: Sequence number generator and packet timestamp clock
//! - [`buffer`]: Send buffer of unacknowledged packets
//! - [`loss_list`]: Ordered set of sequence numbers awaiting retransmission
//! - [`queue`]: Bounded ingress queue between application and sender loop
//! - [`session`]: Flow window, peer socket id, EXP timer capabilities
//! - [`sink`]: Outbound packet transports (UDP, in-process channel)
//! - [`stats`]: Sender counters
//! - [`config`]: TOML configuration
//! - [`sender`]: Sender engine and threaded runtime

pub mod buffer;
pub mod config;
pub mod error;
pub mod loss_list;
pub mod queue;
pub mod sender;
pub mod seq;
pub mod session;
pub mod sink;
pub mod stats;
pub mod wire;

pub use config::SenderConfig;
pub use error::{ConfigError, SenderError, WireError};
pub use sender::{Progress, SenderEngine, UdtSender};
pub use session::{ExpTimer, Session, SessionContext};
pub use sink::{ChannelSink, PacketSink, UdpSink};
pub use stats::{SenderStats, SenderStatsSnapshot};
