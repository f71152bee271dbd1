//! Status codes reported by the SLSQP driver and its least-squares kernels.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of one of the constrained least-squares kernels
/// (`nnls`, `ldp`, `lsi`, `lsei`, `lsq`).
///
/// The numeric values match the classical mode codes so that a failing
/// subproblem can be passed straight through as the driver's exit mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QpStatus {
    Success,
    /// `n < 1`, or more equality constraints than unknowns.
    BadDimensions,
    /// NNLS exceeded its `3n` iteration cap.
    IterationLimit,
    /// The inequality constraints have no common feasible point.
    Incompatible,
    /// The least-squares matrix E is singular.
    SingularE,
    /// The equality constraint matrix C is rank deficient.
    SingularC,
    /// HFTI found a rank defect in the unconstrained remainder.
    RankDefect,
}

impl QpStatus {
    pub fn code(self) -> i64 {
        match self {
            QpStatus::Success => 1,
            QpStatus::BadDimensions => 2,
            QpStatus::IterationLimit => 3,
            QpStatus::Incompatible => 4,
            QpStatus::SingularE => 5,
            QpStatus::SingularC => 6,
            QpStatus::RankDefect => 7,
        }
    }

    pub fn is_success(self) -> bool {
        self == QpStatus::Success
    }
}

/// Exit mode of the SLSQP driver.
///
/// `EvaluateObjective` and `EvaluateGradient` are the two intermediate
/// requests of the reverse-communication protocol; every other variant is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlsqpMode {
    /// Required accuracy obtained.
    Success,
    /// Function and constraint values are needed at the current `x`.
    EvaluateObjective,
    /// Gradient and constraint Jacobian are needed at the current `x`.
    EvaluateGradient,
    TooManyEqualityConstraints,
    QpIterationLimit,
    IncompatibleConstraints,
    SingularE,
    SingularC,
    RankDeficientHfti,
    PositiveDirectionalDerivative,
    IterationLimit,
    /// The caller supplied workspace is smaller than required.
    WorkspaceTooSmall { need_w: usize, need_jw: usize },
}

impl SlsqpMode {
    /// Integer code of this mode.
    ///
    /// Workspace failures encode both required lengths as
    /// `1000 * max(10, need_w) + max(10, need_jw)`.
    pub fn code(self) -> i64 {
        match self {
            SlsqpMode::Success => 0,
            SlsqpMode::EvaluateObjective => 1,
            SlsqpMode::EvaluateGradient => -1,
            SlsqpMode::TooManyEqualityConstraints => 2,
            SlsqpMode::QpIterationLimit => 3,
            SlsqpMode::IncompatibleConstraints => 4,
            SlsqpMode::SingularE => 5,
            SlsqpMode::SingularC => 6,
            SlsqpMode::RankDeficientHfti => 7,
            SlsqpMode::PositiveDirectionalDerivative => 8,
            SlsqpMode::IterationLimit => 9,
            SlsqpMode::WorkspaceTooSmall { need_w, need_jw } => {
                1000 * need_w.max(10) as i64 + need_jw.max(10) as i64
            }
        }
    }

    /// Decode an integer mode.
    ///
    /// Codes of 10 and above are read back as a workspace request. The
    /// lengths are recovered exactly whenever the integer requirement is at
    /// least 10 and below 1000, which covers every `m - meq + 2(n + 1) >= 10`.
    pub fn from_code(code: i64) -> Option<Self> {
        let mode = match code {
            0 => SlsqpMode::Success,
            1 => SlsqpMode::EvaluateObjective,
            -1 => SlsqpMode::EvaluateGradient,
            2 => SlsqpMode::TooManyEqualityConstraints,
            3 => SlsqpMode::QpIterationLimit,
            4 => SlsqpMode::IncompatibleConstraints,
            5 => SlsqpMode::SingularE,
            6 => SlsqpMode::SingularC,
            7 => SlsqpMode::RankDeficientHfti,
            8 => SlsqpMode::PositiveDirectionalDerivative,
            9 => SlsqpMode::IterationLimit,
            c if c >= 10 => SlsqpMode::WorkspaceTooSmall {
                need_w: (c / 1000) as usize,
                need_jw: (c % 1000) as usize,
            },
            _ => return None,
        };
        Some(mode)
    }

    pub fn is_success(self) -> bool {
        self == SlsqpMode::Success
    }

    /// Whether the driver expects to be called again.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            SlsqpMode::EvaluateObjective | SlsqpMode::EvaluateGradient
        )
    }

    /// Human readable reason text.
    pub fn message(self) -> &'static str {
        match self {
            SlsqpMode::Success => "Optimization terminated successfully",
            SlsqpMode::EvaluateObjective => "Function evaluation required (f & c)",
            SlsqpMode::EvaluateGradient => "Gradient evaluation required (g & a)",
            SlsqpMode::TooManyEqualityConstraints => {
                "More equality constraints than independent variables"
            }
            SlsqpMode::QpIterationLimit => "More than 3*n iterations in LSQ subproblem",
            SlsqpMode::IncompatibleConstraints => "Inequality constraints incompatible",
            SlsqpMode::SingularE => "Singular matrix E in LSQ subproblem",
            SlsqpMode::SingularC => "Singular matrix C in LSQ subproblem",
            SlsqpMode::RankDeficientHfti => {
                "Rank-deficient equality constraint subproblem HFTI"
            }
            SlsqpMode::PositiveDirectionalDerivative => {
                "Positive directional derivative for linesearch"
            }
            SlsqpMode::IterationLimit => "Iteration limit reached",
            SlsqpMode::WorkspaceTooSmall { .. } => "Workspace too small",
        }
    }
}

impl From<QpStatus> for SlsqpMode {
    fn from(status: QpStatus) -> Self {
        match status {
            QpStatus::Success => SlsqpMode::EvaluateObjective,
            QpStatus::BadDimensions => SlsqpMode::TooManyEqualityConstraints,
            QpStatus::IterationLimit => SlsqpMode::QpIterationLimit,
            QpStatus::Incompatible => SlsqpMode::IncompatibleConstraints,
            QpStatus::SingularE => SlsqpMode::SingularE,
            QpStatus::SingularC => SlsqpMode::SingularC,
            QpStatus::RankDefect => SlsqpMode::RankDeficientHfti,
        }
    }
}

impl fmt::Display for SlsqpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlsqpMode::WorkspaceTooSmall { need_w, need_jw } => write!(
                f,
                "Workspace too small: need {} reals and {} integers",
                need_w, need_jw
            ),
            mode => f.write_str(mode.message()),
        }
    }
}
