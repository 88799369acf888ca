// BW64
// Copyright (c) 2024 The Project BW64 Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// A bitmask of speaker positions, identical in layout to the `dwChannelMask` field of
    /// Microsoft's `WAVEFORMATEXTENSIBLE` structure.
    ///
    /// Bits without a named position are retained so that a mask read from a stream is written
    /// back unchanged.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Channels: u32 {
        /// Front-left (left) channel.
        const FRONT_LEFT            = 0x0000_0001;
        /// Front-right (right) channel.
        const FRONT_RIGHT           = 0x0000_0002;
        /// Front-center (center) or the Mono channel.
        const FRONT_CENTER          = 0x0000_0004;
        /// Low-frequency effects (LFE) channel.
        const LOW_FREQUENCY         = 0x0000_0008;
        /// Rear-left (back-left) channel.
        const REAR_LEFT             = 0x0000_0010;
        /// Rear-right (back-right) channel.
        const REAR_RIGHT            = 0x0000_0020;
        /// Front left-of-center channel.
        const FRONT_LEFT_CENTER     = 0x0000_0040;
        /// Front right-of-center channel.
        const FRONT_RIGHT_CENTER    = 0x0000_0080;
        /// Rear-center (back-center) channel.
        const REAR_CENTER           = 0x0000_0100;
        /// Side-left channel.
        const SIDE_LEFT             = 0x0000_0200;
        /// Side-right channel.
        const SIDE_RIGHT            = 0x0000_0400;
        /// Top-center channel.
        const TOP_CENTER            = 0x0000_0800;
        /// Top-front-left channel.
        const TOP_FRONT_LEFT        = 0x0000_1000;
        /// Top-front-center channel.
        const TOP_FRONT_CENTER      = 0x0000_2000;
        /// Top-front-right channel.
        const TOP_FRONT_RIGHT       = 0x0000_4000;
        /// Top-rear-left channel.
        const TOP_REAR_LEFT         = 0x0000_8000;
        /// Top-rear-center channel.
        const TOP_REAR_CENTER       = 0x0001_0000;
        /// Top-rear-right channel.
        const TOP_REAR_RIGHT        = 0x0002_0000;

        const _ = !0;
    }
}

impl Channels {
    /// Gets the number of channels.
    pub fn count(self) -> usize {
        self.bits().count_ones() as usize
    }
}

impl fmt::Display for Channels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#034b}", self.bits())
    }
}
