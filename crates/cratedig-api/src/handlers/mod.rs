// SPDX-License-Identifier: GPL-3.0-or-later
pub mod downloads;
pub mod jobs;
