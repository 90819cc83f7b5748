//! HTTP conformance testing.
//!
//! Describe requests and the responses they must produce, run them against a
//! target, and get every deviation reported at once.
//!
//! ```no_run
//! use conformance::config::Config;
//! use conformance::expect::{expect, header};
//! use conformance::http::request;
//! use conformance::testing::{Runner, Suite, TestCase};
//!
//! # async fn run() -> Result<(), conformance::error::Error> {
//! let suite = Suite::new("TestPlainText").case(
//!     TestCase::new("GET hello")
//!         .request(request().path("/ipfs/bafy/hello.txt"))
//!         .response(
//!             expect()
//!                 .status(200)
//!                 .header(header("Content-Type").contains("text/plain"))
//!                 .body("hello\n"),
//!         ),
//! );
//!
//! let report = Runner::new(&Config::from_env()?)?.run_suite(&suite).await;
//! assert!(report.success());
//! # Ok(())
//! # }
//! ```

pub mod blocks;
pub mod check;
pub mod cli;
pub mod collections;
pub mod config;
pub mod error;
pub mod expect;
pub mod http;
pub mod logging;
pub mod plugins;
pub mod specs;
pub mod storage;
pub mod template;
pub mod testing;

pub use error::{Error, Result};
