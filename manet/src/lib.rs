//! manet simulates ad-hoc routing protocols (DSDV, AODV, DSR and OLSR) over a
//! user defined topology, one synchronised step at a time.
//!
//! The [`simulator::Simulator`] owns every [`concepts::client::Client`] and
//! [`concepts::connection::Connection`]. A global step first lets every client
//! run its routing protocol, then flushes every connection, so a message always
//! takes two steps to cross a link.

pub mod concepts;
pub mod driver;
pub mod feedback;
pub mod framework;
pub mod protocols;
pub mod seqno;
pub mod simulator;
pub mod topology;
pub mod util;
