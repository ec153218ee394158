//! Network subsystem: UDP transport and the sender/receiver pipelines

pub mod receiver;
pub mod sender;
pub mod session;
pub mod transport;
pub mod udp;

pub use receiver::{ReceiverPipeline, ReceiverState, ReceiverStats};
pub use sender::{SenderPipeline, SenderState, SenderStats};
pub use session::{DeviceSessionFactory, SessionFactory, StreamSession};
pub use transport::{read_packet, DatagramSink, PacketSource, ReadOutcome};
pub use udp::{create_socket, resolve, UdpPacketSource, UdpSender};
