//! CLI command implementations.
//!
//! | Module    | Commands handled            |
//! |-----------|-----------------------------|
//! | `project` | `Init`, `Clear`, `Config`   |
//! | `status`  | `Status`                    |
//! | `reply`   | `Reply`                     |

pub mod project;
pub mod reply;
pub mod status;

pub use project::{cmd_clear, cmd_config, cmd_init};
pub use reply::cmd_reply;
pub use status::cmd_status;
