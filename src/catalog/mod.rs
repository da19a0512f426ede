//! Static catalog of mutation operators.
//!
//! Every mutation kind owns a substitution table mapping an original
//! operator token to its replacement. A kind that has no entry for a given
//! token simply produces no candidate at that site.

use serde::{Deserialize, Serialize};

/// The closed set of mutation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutantKind {
    /// Swaps `<`/`<=` and `>`/`>=`.
    ConditionalsBoundary,
    /// Flips `==`↔`!=` and negates the orderings (`<`→`>=`, `>`→`<=`).
    ConditionalsNegation,
    /// Swaps `+=`↔`-=`.
    IncrementDecrement,
    /// Removes a unary minus (`-x` → `x`).
    InvertNegatives,
    /// Swaps among `+`, `-`, `*`, `/`, `%`.
    ArithmeticBase,
    /// Swaps `&&`↔`||`.
    InvertLogical,
    /// Swaps among `&`, `|`, `^`.
    InvertBitwise,
    /// Swaps among the arithmetic compound assignments.
    InvertAssignments,
    /// Swaps among the bitwise compound assignments.
    InvertBitwiseAssign,
    /// Swaps `break`↔`continue`.
    InvertLoopCtrl,
    /// Rewrites `x OP= y` into `x = y`.
    RemoveSelfAssignments,
}

/// Where in the syntax tree an operator token was found.
///
/// Substitution tables are scoped by site so that, for example, a binary
/// `-` (subtraction) never matches the unary-negation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorSite {
    /// Binary expression operator (`a + b`, `a < b`, ...).
    Binary,
    /// Unary expression operator (`-x`).
    Unary,
    /// Compound assignment operator (`a += b`, `a &= b`, ...).
    CompoundAssign,
    /// `break` or `continue` inside a loop body.
    LoopControl,
}

impl MutantKind {
    /// Every kind, in catalog order.
    pub const ALL: [MutantKind; 11] = [
        MutantKind::ConditionalsBoundary,
        MutantKind::ConditionalsNegation,
        MutantKind::IncrementDecrement,
        MutantKind::InvertNegatives,
        MutantKind::ArithmeticBase,
        MutantKind::InvertLogical,
        MutantKind::InvertBitwise,
        MutantKind::InvertAssignments,
        MutantKind::InvertBitwiseAssign,
        MutantKind::InvertLoopCtrl,
        MutantKind::RemoveSelfAssignments,
    ];

    /// Stable display name used in reports and logs.
    pub fn name(&self) -> &'static str {
        match self {
            MutantKind::ConditionalsBoundary => "CONDITIONALS_BOUNDARY",
            MutantKind::ConditionalsNegation => "CONDITIONALS_NEGATION",
            MutantKind::IncrementDecrement => "INCREMENT_DECREMENT",
            MutantKind::InvertNegatives => "INVERT_NEGATIVES",
            MutantKind::ArithmeticBase => "ARITHMETIC_BASE",
            MutantKind::InvertLogical => "INVERT_LOGICAL",
            MutantKind::InvertBitwise => "INVERT_BITWISE",
            MutantKind::InvertAssignments => "INVERT_ASSIGNMENTS",
            MutantKind::InvertBitwiseAssign => "INVERT_BITWISE_ASSIGN",
            MutantKind::InvertLoopCtrl => "INVERT_LOOP_CTRL",
            MutantKind::RemoveSelfAssignments => "REMOVE_SELF_ASSIGNMENTS",
        }
    }

    /// Key used in the configuration's per-operator enable table.
    pub fn key(&self) -> &'static str {
        match self {
            MutantKind::ConditionalsBoundary => "conditionals_boundary",
            MutantKind::ConditionalsNegation => "conditionals_negation",
            MutantKind::IncrementDecrement => "increment_decrement",
            MutantKind::InvertNegatives => "invert_negatives",
            MutantKind::ArithmeticBase => "arithmetic_base",
            MutantKind::InvertLogical => "invert_logical",
            MutantKind::InvertBitwise => "invert_bitwise",
            MutantKind::InvertAssignments => "invert_assignments",
            MutantKind::InvertBitwiseAssign => "invert_bitwise_assign",
            MutantKind::InvertLoopCtrl => "invert_loop_ctrl",
            MutantKind::RemoveSelfAssignments => "remove_self_assignments",
        }
    }

    /// Conservative defaults: the inversion kinds are noisier and stay off
    /// unless enabled explicitly.
    pub fn enabled_by_default(&self) -> bool {
        matches!(
            self,
            MutantKind::ConditionalsBoundary
                | MutantKind::ConditionalsNegation
                | MutantKind::IncrementDecrement
                | MutantKind::InvertNegatives
                | MutantKind::ArithmeticBase
        )
    }

    /// The operator site this kind targets.
    pub fn applies_to(&self, site: OperatorSite) -> bool {
        let want = match self {
            MutantKind::ConditionalsBoundary
            | MutantKind::ConditionalsNegation
            | MutantKind::ArithmeticBase
            | MutantKind::InvertLogical
            | MutantKind::InvertBitwise => OperatorSite::Binary,
            MutantKind::InvertNegatives => OperatorSite::Unary,
            MutantKind::IncrementDecrement
            | MutantKind::InvertAssignments
            | MutantKind::InvertBitwiseAssign
            | MutantKind::RemoveSelfAssignments => OperatorSite::CompoundAssign,
            MutantKind::InvertLoopCtrl => OperatorSite::LoopControl,
        };
        want == site
    }
}

impl std::fmt::Display for MutantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The substitution table for a kind: `(original, replacement)` pairs.
pub fn substitutions(kind: MutantKind) -> &'static [(&'static str, &'static str)] {
    match kind {
        MutantKind::ConditionalsBoundary => {
            &[("<", "<="), ("<=", "<"), (">", ">="), (">=", ">")]
        }
        MutantKind::ConditionalsNegation => &[
            ("==", "!="),
            ("!=", "=="),
            ("<", ">="),
            ("<=", ">"),
            (">", "<="),
            (">=", "<"),
        ],
        MutantKind::IncrementDecrement => &[("+=", "-="), ("-=", "+=")],
        // Rust has no unary `+`; removing the operator is the same edit the
        // original `-x` → `x` swap performs.
        MutantKind::InvertNegatives => &[("-", "")],
        MutantKind::ArithmeticBase => &[
            ("+", "-"),
            ("-", "+"),
            ("*", "/"),
            ("/", "*"),
            ("%", "*"),
        ],
        MutantKind::InvertLogical => &[("&&", "||"), ("||", "&&")],
        MutantKind::InvertBitwise => &[("&", "|"), ("|", "&"), ("^", "&")],
        MutantKind::InvertAssignments => &[
            ("+=", "-="),
            ("-=", "+="),
            ("*=", "/="),
            ("/=", "*="),
            ("%=", "*="),
        ],
        MutantKind::InvertBitwiseAssign => &[("&=", "|="), ("|=", "&="), ("^=", "&=")],
        MutantKind::InvertLoopCtrl => &[("break", "continue"), ("continue", "break")],
        MutantKind::RemoveSelfAssignments => &[
            ("+=", "="),
            ("-=", "="),
            ("*=", "="),
            ("/=", "="),
            ("%=", "="),
            ("&=", "="),
            ("|=", "="),
            ("^=", "="),
            ("<<=", "="),
            (">>=", "="),
        ],
    }
}

/// Look up the replacement for `token` under `kind`, if any.
pub fn substitution(kind: MutantKind, token: &str) -> Option<&'static str> {
    substitutions(kind)
        .iter()
        .find(|(orig, _)| *orig == token)
        .map(|(_, repl)| *repl)
}
