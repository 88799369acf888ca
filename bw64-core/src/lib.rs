// BW64
// Copyright (c) 2024 The Project BW64 Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared foundations of the BW64 container engine: the error type, byte-level I/O, chunk
//! identifiers and the speaker-position mask.

pub mod channels;
pub mod errors;
pub mod fourcc;
pub mod io;
