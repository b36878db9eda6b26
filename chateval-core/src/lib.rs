// Copyright 2025 Chateval Contributors
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

//! Shared data model for chat answer evaluation.
//!
//! Everything here is plain data: the labelled rows fed into an evaluation
//! run, the test cases handed to metrics, and the records a run produces.

pub mod eval_result;
pub mod test_case;

pub use eval_result::{EvaluationResult, MetricOutput};
pub use test_case::{EvaluationTestCase, StructuredContext, TestCase, TestCaseParam};
