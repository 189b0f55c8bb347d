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

//! Runnable coordinator and participant nodes.
//!
//! A node pairs an algorithm from [`two_phase_commit`](crate::two_phase_commit) with a
//! write-ahead log and an in-memory registry of transactions. Nodes are built from their log, so
//! a node rebuilt over the log of one which stopped resumes where it left off.

mod coordinator;
mod coordinator_builder;
mod fault;
mod participant;
mod participant_builder;

pub use coordinator::{CoordinatorNode, CoordinatorStatus, DeliveryAlarm, TransactionOutcome};
pub use coordinator_builder::CoordinatorBuilder;
pub use fault::{FaultAction, FaultHook, FaultPoint, InjectedFault, NoFaults};
pub use participant::{ParticipantNode, ParticipantStatus};
pub use participant_builder::ParticipantBuilder;
