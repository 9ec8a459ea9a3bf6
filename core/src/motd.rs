//! Message of the day

use crate::{config::MotdConfig, Message, NumericReply, Result};
use std::path::Path;
use tracing::{info, warn};

/// Holds the MOTD banner sent at the end of registration
#[derive(Debug, Default)]
pub struct MotdManager {
    lines: Vec<String>,
}

impl MotdManager {
    /// Build the MOTD from configuration, loading the file if one is set.
    ///
    /// A missing file is not an error; the configured banner lines are used
    /// instead.
    pub fn from_config(config: &MotdConfig) -> Result<Self> {
        let mut manager = Self {
            lines: config.lines.clone(),
        };
        if let Some(ref file) = config.file {
            if Path::new(file).exists() {
                manager.load_file(file)?;
            } else {
                warn!("MOTD file not found: {}", file);
            }
        }
        Ok(manager)
    }

    /// Replace the banner with the contents of a file, one 372 per line
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let content = std::fs::read_to_string(&path)?;
        self.lines = content.lines().map(|line| line.to_string()).collect();
        info!(
            "Loaded MOTD from {} ({} lines)",
            path.as_ref().display(),
            self.lines.len()
        );
        Ok(())
    }

    /// Banner lines
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Build the full 375/372*/376 block for a client
    pub fn messages(&self, target: &str, server: &str) -> Vec<Message> {
        let mut messages = vec![NumericReply::motd_start(target, server)];
        for line in &self.lines {
            messages.push(NumericReply::motd_line(target, line));
        }
        messages.push(NumericReply::motd_end(target));
        messages
    }
}
