// BW64
// Copyright (c) 2024 The Project BW64 Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

/// A four character code identifying a chunk or container type.
///
/// The code is compared byte-for-byte and is only ever interpreted as text for display.
#[derive(PartialEq, Eq, Hash, Clone, Copy)]
#[repr(transparent)]
pub struct FourCc {
    val: [u8; 4],
}

impl FourCc {
    /// Construct a new FourCC code from the given byte array.
    pub const fn new(val: [u8; 4]) -> Self {
        Self { val }
    }

    /// Get the raw bytes of the code.
    pub const fn get(&self) -> [u8; 4] {
        self.val
    }
}

impl From<[u8; 4]> for FourCc {
    fn from(val: [u8; 4]) -> Self {
        Self::new(val)
    }
}

impl PartialEq<[u8; 4]> for FourCc {
    fn eq(&self, other: &[u8; 4]) -> bool {
        self.val == *other
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.val) {
            Ok(name) => f.write_str(name),
            _ => write!(f, "{:x?}", self.val),
        }
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.val))
    }
}
