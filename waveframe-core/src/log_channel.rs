// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Leveled, channel-tagged logging. Emission goes through the `log` crate's
//! facade so a host application can route it with whatever subscriber it
//! already has installed; what this module adds on top is the channel tag
//! and an enable/disable gate per channel.

use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Channel {
    Io = 0,
    Http = 1,
    Demuxer = 2,
    FlacCodec = 3,
    Streaming = 4,
    Memory = 5,
    /// Reserved for the widget/windowing layer, outside this core's scope;
    /// kept here so the channel enum matches the full set operators expect
    /// to be able to toggle.
    Widget = 6,
    IsoMp4 = 7,
}

impl Channel {
    fn bit(self) -> u32 {
        1 << (self as u8)
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::Io => "io",
            Channel::Http => "http",
            Channel::Demuxer => "demuxer",
            Channel::FlacCodec => "flac_codec",
            Channel::Streaming => "streaming",
            Channel::Memory => "memory",
            Channel::Widget => "widget",
            Channel::IsoMp4 => "isomp4",
        }
    }
}

pub use log::Level;

static ENABLED_MASK: AtomicU32 = AtomicU32::new(u32::MAX);

/// Enables or disables a channel. All channels are enabled by default.
pub fn set_channel_enabled(channel: Channel, enabled: bool) {
    let bit = channel.bit();
    let mut current = ENABLED_MASK.load(Ordering::Relaxed);
    loop {
        let next = if enabled { current | bit } else { current & !bit };
        match ENABLED_MASK.compare_exchange_weak(
            current,
            next,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current = actual,
        }
    }
}

pub fn channel_enabled(channel: Channel) -> bool {
    ENABLED_MASK.load(Ordering::Relaxed) & channel.bit() != 0
}

/// Emits a log line on `channel` at `level`, prefixed with the channel name,
/// if that channel is currently enabled.
pub fn log_msg(channel: Channel, level: Level, message: &str) {
    if !channel_enabled(channel) {
        return;
    }
    log::log!(level, "[{}] {}", channel.name(), message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabling_a_channel_does_not_affect_others() {
        set_channel_enabled(Channel::Widget, false);
        assert!(!channel_enabled(Channel::Widget));
        assert!(channel_enabled(Channel::Io));
        set_channel_enabled(Channel::Widget, true);
        assert!(channel_enabled(Channel::Widget));
    }
}
