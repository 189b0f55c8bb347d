// Copyright 2021-2022 Cargill Incorporated
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

//! An implementation of the 2PC (Two-Phase Commit) atomic commitment protocol for a single
//! operation.
//!
//! The algorithms follow the centralized protocol described in:
//!
//! - Bernstein, Hadzilacos, and Goodman, Concurrency Control and Recovery in Database Systems,
//!   7.4.  This book may be downloaded for free from
//!   <https://www.microsoft.com/en-us/research/people/philbe/>.
//!
//! A coordinator logs its intent, collects a vote from every participant, logs a decision
//! (commit only if every vote was yes), and then delivers that decision. A participant logs its
//! vote before answering, and once it has voted yes it waits for the decision however long that
//! takes. If the coordinator fails between logging the decision and delivering it, yes-voters
//! stay blocked until the coordinator recovers and redelivers.

mod coordinator_action;
mod coordinator_algorithm;
mod coordinator_context;
mod coordinator_event;
mod operation;
mod participant_action;
mod participant_algorithm;
mod participant_context;
mod participant_event;
mod vote;

pub use coordinator_action::{CoordinatorAction, CoordinatorActionNotification};
pub use coordinator_algorithm::CoordinatorAlgorithm;
pub use coordinator_context::{CoordinatorContext, CoordinatorState, CoordinatorTransaction};
pub use coordinator_event::CoordinatorEvent;
pub use operation::{validate_txid, Operation, OperationType, TxId};
pub use participant_action::{ParticipantAction, ParticipantActionNotification, ParticipantReply};
pub use participant_algorithm::ParticipantAlgorithm;
pub use participant_context::{ParticipantContext, ParticipantState, ParticipantTransaction};
pub use participant_event::ParticipantEvent;
pub use vote::{Decision, Vote};
