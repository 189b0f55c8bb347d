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

//! Injectable fault points for reproducing coordinator failures.

use std::time::Duration;

/// A point in the coordinator's run of a transaction at which a fault can be injected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultPoint {
    /// The PREPARE record is durable; no participant has been contacted.
    AfterPrepareLogged,
    /// The DECISION record is durable; no participant has been told the decision. Crashing
    /// here leaves every yes-voter blocked in `Ready`.
    AfterDecisionLogged,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultAction {
    Continue,
    /// Pause for the given duration, then continue.
    Delay(Duration),
    /// Stop working on the transaction as if the process had died.
    Crash,
}

/// Decides what happens when a transaction reaches a fault point.
pub trait FaultHook: Send + Sync {
    fn at(&self, point: FaultPoint, txid: &str) -> FaultAction;
}

/// The hook used when none is configured; it never injects a fault.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFaults;

impl FaultHook for NoFaults {
    fn at(&self, _point: FaultPoint, _txid: &str) -> FaultAction {
        FaultAction::Continue
    }
}

/// Injects one action at one fault point, for every transaction or for a single one.
#[derive(Clone, Debug)]
pub struct InjectedFault {
    point: FaultPoint,
    action: FaultAction,
    txid: Option<String>,
}

impl InjectedFault {
    pub fn new(point: FaultPoint, action: FaultAction) -> Self {
        InjectedFault {
            point,
            action,
            txid: None,
        }
    }

    /// Crash every transaction right after its decision is logged.
    pub fn crash_after_decision() -> Self {
        InjectedFault::new(FaultPoint::AfterDecisionLogged, FaultAction::Crash)
    }

    /// Restricts the fault to a single transaction.
    pub fn for_transaction<S: Into<String>>(mut self, txid: S) -> Self {
        self.txid = Some(txid.into());
        self
    }
}

impl FaultHook for InjectedFault {
    fn at(&self, point: FaultPoint, txid: &str) -> FaultAction {
        let txid_matches = self.txid.as_deref().map(|t| t == txid).unwrap_or(true);

        if point == self.point && txid_matches {
            self.action
        } else {
            FaultAction::Continue
        }
    }
}
