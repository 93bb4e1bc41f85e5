// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::VecDeque;

use crate::flight::Coordinate;

/// Default number of trail samples kept per flight.
pub const DEFAULT_HISTORY_LEN: usize = 30;

/// Bounded trail of recent positions, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionHistory {
    samples: VecDeque<Coordinate>,
    capacity: usize,
}

impl Default for PositionHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_LEN)
    }
}

impl PositionHistory {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest once full.
    pub fn push(&mut self, position: Coordinate) {
        if self.capacity == 0 {
            return;
        }
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(position);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn latest(&self) -> Option<Coordinate> {
        self.samples.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coordinate> {
        self.samples.iter()
    }

    /// Copy the trail out, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Coordinate> {
        self.iter().copied().collect()
    }
}
