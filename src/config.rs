// Lava GVM - An emulator for LAV bytecode programs of monochrome handhelds
// Copyright (C) 2026  Marcel Joachim Kloubert <marcel@kloubert.dev>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Emulator configuration.
//!
//! A [`Config`] is built once by the host and handed to
//! [`Runtime::new`](crate::runtime::Runtime::new) by reference.

use std::path::PathBuf;
use std::time::Duration;

/// Default directory of the sandboxed file store.
pub const DEFAULT_FS_ROOT: &str = "GvmFiles";

/// What `prepare` does with RAM outside the frame stack region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RamPolicy {
    /// Leave it as the previous run left it.
    #[default]
    KeepBetweenRuns,
    /// Zero the whole address space.
    ClearOnPrepare,
}

/// Host configuration of the emulator.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host directory mapped to `/` of the file store.
    pub fs_root: PathBuf,
    /// Directory holding the font files. Text renders blank without it.
    pub font_dir: Option<PathBuf>,
    /// Instructions executed between two throttling pauses.
    pub steps_per_tick: u32,
    /// Length of a throttling pause.
    pub tick_delay: Duration,
    /// Whether the host throttles execution at all.
    pub delay_enabled: bool,
    pub ram_policy: RamPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fs_root: PathBuf::from(DEFAULT_FS_ROOT),
            font_dir: None,
            steps_per_tick: 1000,
            tick_delay: Duration::from_nanos(500),
            delay_enabled: false,
            ram_policy: RamPolicy::default(),
        }
    }
}

impl Config {
    /// Pause to take after `steps` executed instructions, if any.
    pub fn throttle(&self, steps: u64) -> Option<Duration> {
        let every = u64::from(self.steps_per_tick.max(1));
        (self.delay_enabled && steps % every == 0).then_some(self.tick_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.fs_root, PathBuf::from("GvmFiles"));
        assert_eq!(config.ram_policy, RamPolicy::KeepBetweenRuns);
        assert!(config.font_dir.is_none());
        assert_eq!(config.steps_per_tick, 1000);
        assert!(!config.delay_enabled);
    }

    #[test]
    fn test_throttle() {
        let mut config = Config {
            steps_per_tick: 10,
            ..Config::default()
        };
        assert_eq!(config.throttle(10), None);

        config.delay_enabled = true;
        assert_eq!(config.throttle(9), None);
        assert_eq!(config.throttle(20), Some(config.tick_delay));
    }
}
