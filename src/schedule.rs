// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Session schedule board with room conflict detection.
//!
//! Two sessions conflict when they share a room and their half-open
//! `[start_at, end_at)` intervals overlap. Sessions without a room never
//! conflict. Persisting a room assignment re-runs the validation under that
//! room's upsert lock, so two concurrent claims on the same slot admit exactly
//! one winner.

use crate::base::{EventId, RoomId, SessionId};
use crate::error::EngineError;
use crate::retry::{RetryPolicy, lock_with_retry};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A conference session, optionally assigned to a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub event_id: EventId,
    /// `None` means unscheduled/virtual; such sessions never conflict.
    pub room_id: Option<RoomId>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

/// Result of a schedule validation or upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScheduleOutcome {
    /// The slot is free.
    Clear,
    /// The slot overlaps an existing session in the same room.
    Conflict { with: SessionId },
}

impl ScheduleOutcome {
    pub fn is_clear(&self) -> bool {
        matches!(self, ScheduleOutcome::Clear)
    }
}

/// Half-open interval overlap test.
fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// All sessions of an event space, indexed by id.
#[derive(Debug, Default)]
pub struct ScheduleBoard {
    sessions: DashMap<SessionId, Session>,
    /// Per-room upsert serialization so validate-then-persist is atomic.
    rooms: DashMap<RoomId, Arc<Mutex<()>>>,
}

impl ScheduleBoard {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    /// Checks whether `[start_at, end_at)` in `room_id` is free, ignoring the
    /// session identified by `exclude` (the one being updated).
    ///
    /// A `None` room is always clear. Advisory on its own: callers persisting
    /// an assignment must go through [`ScheduleBoard::upsert`], which re-runs
    /// this check under the room lock.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidArgument`] when `start_at >= end_at`.
    pub fn validate(
        &self,
        exclude: Option<SessionId>,
        room_id: Option<RoomId>,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, EngineError> {
        if start_at >= end_at {
            return Err(EngineError::InvalidArgument(
                "session interval must satisfy start < end",
            ));
        }
        let Some(room_id) = room_id else {
            return Ok(ScheduleOutcome::Clear);
        };
        for entry in self.sessions.iter() {
            let other = entry.value();
            if Some(other.id) == exclude || other.room_id != Some(room_id) {
                continue;
            }
            if overlaps(start_at, end_at, other.start_at, other.end_at) {
                return Ok(ScheduleOutcome::Conflict { with: other.id });
            }
        }
        Ok(ScheduleOutcome::Clear)
    }

    /// Creates or updates a session. Room assignments are validated and
    /// persisted under the room's upsert lock; on `Conflict` nothing changes.
    pub fn upsert(
        &self,
        session: Session,
        policy: &RetryPolicy,
    ) -> Result<ScheduleOutcome, EngineError> {
        let Some(room_id) = session.room_id else {
            if session.start_at >= session.end_at {
                return Err(EngineError::InvalidArgument(
                    "session interval must satisfy start < end",
                ));
            }
            self.sessions.insert(session.id, session);
            return Ok(ScheduleOutcome::Clear);
        };

        let room_lock = Arc::clone(
            self.rooms
                .entry(room_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let _guard = lock_with_retry("room", &room_lock, policy)?;

        match self.validate(Some(session.id), Some(room_id), session.start_at, session.end_at)? {
            ScheduleOutcome::Clear => {
                self.sessions.insert(session.id, session);
                Ok(ScheduleOutcome::Clear)
            }
            conflict => Ok(conflict),
        }
    }

    pub fn session(&self, id: &SessionId) -> Option<Session> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    /// All sessions, sorted by id.
    pub fn sessions(&self) -> Vec<Session> {
        let mut out: Vec<Session> = self.sessions.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|s| s.id.0);
        out
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
