// Library root
// -----------
// The binary (`main.rs`) wires these modules together; everything below
// `mirror` talks to the remote service only through the traits in `api`,
// so the mirroring logic is testable without network access.
//
// Module responsibilities:
// - `link`: decodes the course id out of a Classroom share link.
// - `folder`: naming rules for the course root, group folders and files.
// - `download`: streams one Drive file to disk, skipping existing files.
// - `mirror`: walks a course and drives `folder` and `download`.
// - `api` / `model`: Classroom and Drive REST client and payload types.
// - `auth` / `consent`: token cache, refresh and the browser consent flow.
// - `config`, `logging`, `ui`, `error`: CLI options, tracing setup,
//   console output and the shared error type.
pub mod api;
pub mod auth;
pub mod config;
pub mod consent;
pub mod download;
pub mod error;
pub mod folder;
pub mod link;
pub mod logging;
pub mod mirror;
pub mod model;
pub mod ui;

pub use error::{Error, Result};
