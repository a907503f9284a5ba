//! # snmp-engine
//!
//! SNMP v1/v2c engine for Rust, speaking BER over UDP in both directions:
//! as a **manager** it multiplexes concurrent requests over one socket and
//! correlates responses back to their callers; as an **agent** it dispatches
//! incoming requests to registered OID handlers inside a provider-supplied
//! transaction.
//!
//! The heart of the crate is the [`SnmpContext`]: a long-lived runtime that
//! owns a UDP endpoint and a small set of cooperating tasks (request
//! tracker, outbound flow controller, inbound listener, stats tracker),
//! supervised so that a failed I/O pair is restarted rather than taking the
//! whole engine down.
//!
//! ## Manager example
//!
//! ```rust,no_run
//! use snmp_engine::{ClientRequest, ContextConfig, SnmpContext, oid};
//!
//! #[tokio::main]
//! async fn main() -> snmp_engine::Result<()> {
//!     let ctx = SnmpContext::manager(ContextConfig::new("poller", 64)).await?;
//!
//!     let resp = ctx
//!         .send_request(ClientRequest::get(
//!             "192.168.1.1:161".parse().unwrap(),
//!             "public",
//!             [oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)],
//!         ))
//!         .await?;
//!     println!("sysDescr: {}", resp.varbinds[0].value);
//!
//!     ctx.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Agent example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use snmp_engine::agent::{Agent, NoopTransactions, OidHandler};
//! use snmp_engine::{Oid, Value, VarBind, oid};
//!
//! struct SysDescr;
//!
//! impl OidHandler<()> for SysDescr {
//!     fn get(&self, oid: &Oid, _txn: &mut ()) -> snmp_engine::Result<VarBind> {
//!         Ok(VarBind::new(oid.clone(), Value::from("engine under test")))
//!     }
//!
//!     fn set(&self, vb: &VarBind, _txn: &mut ()) -> snmp_engine::Result<VarBind> {
//!         Ok(vb.clone())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> snmp_engine::Result<()> {
//!     let agent = Agent::builder("box", 32, NoopTransactions)
//!         .register_single_var_handler(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Arc::new(SysDescr))
//!         .start()
//!         .await?;
//!
//!     agent.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod ber;
pub mod context;
pub mod error;
pub mod message;
pub mod oid;
pub mod pdu;
pub mod pool;
pub mod stats;
pub mod value;
pub mod varbind;
pub mod version;

// Re-exports for convenience
pub use context::{ClientRequest, ContextConfig, SnmpContext};
pub use error::{DecodeErrorKind, Error, ErrorStatus, Result};
pub use message::{MessageBody, SnmpMessage};
pub use oid::Oid;
pub use pdu::{Pdu, PduType, TrapV1Pdu};
pub use stats::{StatKind, StatsBin};
pub use value::{BitString, Value};
pub use varbind::VarBind;
pub use version::Version;
