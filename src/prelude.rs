pub use std::io::Write;

pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, trace, warn};
pub use tokio::sync::broadcast;

pub use crate::channels::Channels;
pub use crate::config::{self, Config, ConfigWrapper};
pub use crate::coordinator;
pub use crate::deye;
pub use crate::home_assistant;
pub use crate::mqtt;
pub use crate::options::Options;
pub use crate::utils::Utils;
