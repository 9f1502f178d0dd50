// SPDX-License-Identifier: MPL-2.0

//! Non-public mechanics of the solver.

pub(crate) mod arena;
pub(crate) mod incompatibility;
pub(crate) mod partial_solution;

pub(crate) use arena::{Arena, Id};
pub(crate) use incompatibility::{Cause, IncompId, Incompatibility, Relation};
pub(crate) use partial_solution::PartialSolution;
