//! Candidate enumeration over a parsed syntax tree.
//!
//! The visitor collects every operator-bearing node (binary expressions,
//! compound assignments, unary negation, `break`/`continue`), then each
//! enabled mutation kind with a substitution for the token emits one
//! candidate. Test-only code (`#[test]` items, `#[cfg(test)]` modules) is
//! not a mutation target and is skipped during the traversal.

use proc_macro2::Span;
use syn::spanned::Spanned;
use syn::visit::{self, Visit};

use crate::catalog::{self, MutantKind, OperatorSite};
use crate::mutation::{Mutant, SourceTree, TokenSpan};

/// Enumerate every candidate for `tree`, in source order.
pub fn scan_tree(pkg: &str, tree: &SourceTree, enabled: &[MutantKind]) -> Vec<Mutant> {
    let mut visitor = OperatorVisitor::default();
    visitor.visit_file(tree.ast());

    let mut mutants = Vec::new();
    for op in visitor.operators {
        for &kind in enabled {
            if !kind.applies_to(op.site) {
                continue;
            }
            if let Some(replacement) = catalog::substitution(kind, op.token) {
                mutants.push(Mutant::new(
                    pkg,
                    tree.rel_path().to_path_buf(),
                    tree.shared_source(),
                    op.span,
                    kind,
                    op.token,
                    replacement,
                ));
            }
        }
    }

    mutants
}

/// One operator occurrence in the tree.
struct OperatorToken {
    site: OperatorSite,
    token: &'static str,
    span: TokenSpan,
}

#[derive(Default)]
struct OperatorVisitor {
    operators: Vec<OperatorToken>,
}

impl OperatorVisitor {
    fn record(&mut self, site: OperatorSite, token: &'static str, span: Span) {
        self.operators.push(OperatorToken {
            site,
            token,
            span: token_span(span),
        });
    }
}

impl<'ast> Visit<'ast> for OperatorVisitor {
    fn visit_expr_binary(&mut self, node: &'ast syn::ExprBinary) {
        if let Some((token, site)) = bin_op_token(&node.op) {
            self.record(site, token, node.op.span());
        }
        visit::visit_expr_binary(self, node);
    }

    fn visit_expr_unary(&mut self, node: &'ast syn::ExprUnary) {
        if let syn::UnOp::Neg(op) = &node.op {
            self.record(OperatorSite::Unary, "-", op.span());
        }
        visit::visit_expr_unary(self, node);
    }

    fn visit_expr_break(&mut self, node: &'ast syn::ExprBreak) {
        self.record(
            OperatorSite::LoopControl,
            "break",
            node.break_token.span(),
        );
        visit::visit_expr_break(self, node);
    }

    fn visit_expr_continue(&mut self, node: &'ast syn::ExprContinue) {
        self.record(
            OperatorSite::LoopControl,
            "continue",
            node.continue_token.span(),
        );
        visit::visit_expr_continue(self, node);
    }

    fn visit_item_mod(&mut self, node: &'ast syn::ItemMod) {
        if is_test_only(&node.attrs) {
            return;
        }
        visit::visit_item_mod(self, node);
    }

    fn visit_item_fn(&mut self, node: &'ast syn::ItemFn) {
        if is_test_only(&node.attrs) {
            return;
        }
        visit::visit_item_fn(self, node);
    }
}

/// Recognizes `#[test]`-style attributes (any path ending in `test`, which
/// also catches `#[tokio::test]`) and `#[cfg(test)]`.
fn is_test_only(attrs: &[syn::Attribute]) -> bool {
    attrs.iter().any(|attr| {
        let path = attr.path();
        if path
            .segments
            .last()
            .is_some_and(|seg| seg.ident == "test")
        {
            return true;
        }
        if path.is_ident("cfg") {
            if let syn::Meta::List(list) = &attr.meta {
                return list.tokens.to_string().contains("test");
            }
        }
        false
    })
}

fn token_span(span: Span) -> TokenSpan {
    let range = span.byte_range();
    let start = span.start();
    TokenSpan {
        start: range.start,
        end: range.end,
        line: start.line as u32,
        // LineColumn columns are 0-based; positions report 1-based.
        column: start.column as u32 + 1,
    }
}

fn bin_op_token(op: &syn::BinOp) -> Option<(&'static str, OperatorSite)> {
    use syn::BinOp;

    let entry = match op {
        BinOp::Add(_) => ("+", OperatorSite::Binary),
        BinOp::Sub(_) => ("-", OperatorSite::Binary),
        BinOp::Mul(_) => ("*", OperatorSite::Binary),
        BinOp::Div(_) => ("/", OperatorSite::Binary),
        BinOp::Rem(_) => ("%", OperatorSite::Binary),
        BinOp::And(_) => ("&&", OperatorSite::Binary),
        BinOp::Or(_) => ("||", OperatorSite::Binary),
        BinOp::BitAnd(_) => ("&", OperatorSite::Binary),
        BinOp::BitOr(_) => ("|", OperatorSite::Binary),
        BinOp::BitXor(_) => ("^", OperatorSite::Binary),
        BinOp::Shl(_) => ("<<", OperatorSite::Binary),
        BinOp::Shr(_) => (">>", OperatorSite::Binary),
        BinOp::Eq(_) => ("==", OperatorSite::Binary),
        BinOp::Ne(_) => ("!=", OperatorSite::Binary),
        BinOp::Lt(_) => ("<", OperatorSite::Binary),
        BinOp::Le(_) => ("<=", OperatorSite::Binary),
        BinOp::Gt(_) => (">", OperatorSite::Binary),
        BinOp::Ge(_) => (">=", OperatorSite::Binary),
        BinOp::AddAssign(_) => ("+=", OperatorSite::CompoundAssign),
        BinOp::SubAssign(_) => ("-=", OperatorSite::CompoundAssign),
        BinOp::MulAssign(_) => ("*=", OperatorSite::CompoundAssign),
        BinOp::DivAssign(_) => ("/=", OperatorSite::CompoundAssign),
        BinOp::RemAssign(_) => ("%=", OperatorSite::CompoundAssign),
        BinOp::BitAndAssign(_) => ("&=", OperatorSite::CompoundAssign),
        BinOp::BitOrAssign(_) => ("|=", OperatorSite::CompoundAssign),
        BinOp::BitXorAssign(_) => ("^=", OperatorSite::CompoundAssign),
        BinOp::ShlAssign(_) => ("<<=", OperatorSite::CompoundAssign),
        BinOp::ShrAssign(_) => (">>=", OperatorSite::CompoundAssign),
        _ => return None,
    };

    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const SOURCE: &str = r#"
pub fn tally(limit: i32, skip: i32) -> i32 {
    let mut total = 0;
    for i in 0..100 {
        if i == skip {
            continue;
        }
        if i < limit && total != -1 {
            total += i;
        } else {
            total -= 1;
        }
        if total > 90 {
            break;
        }
    }
    -total
}

#[test]
fn direct_test() {
    let x = 1 + 2;
    assert!(x < 4);
}

#[cfg(test)]
mod tests {
    fn helper() -> i32 {
        10 * 3
    }
}
"#;

    fn tree() -> SourceTree {
        SourceTree::parse(PathBuf::from("src/lib.rs"), SOURCE.to_string()).unwrap()
    }

    fn scan_all() -> Vec<Mutant> {
        scan_tree("example", &tree(), &MutantKind::ALL)
    }

    #[test]
    fn test_spans_index_the_original_token() {
        let mutants = scan_all();
        assert!(!mutants.is_empty());
        for m in &mutants {
            let span = m.span();
            assert_eq!(
                &SOURCE[span.start..span.end],
                m.original(),
                "span does not cover the {} token",
                m.original()
            );
        }
    }

    #[test]
    fn test_operator_sites_are_found() {
        let mutants = scan_all();
        let originals: Vec<&str> = mutants.iter().map(|m| m.original()).collect();

        for expected in ["==", "<", "&&", "!=", "-", "+=", "-=", ">", "break", "continue"] {
            assert!(
                originals.contains(&expected),
                "no candidate for token {expected}, got {originals:?}"
            );
        }
    }

    #[test]
    fn test_test_code_is_not_mutated() {
        let mutants = scan_all();
        // `1 + 2` in the #[test] fn and `10 * 3` in the cfg(test) module
        // must produce nothing; the only `*`-table hits would come from
        // them.
        assert!(mutants
            .iter()
            .all(|m| m.original() != "*" && m.original() != "+"));
    }

    #[test]
    fn test_disabled_kinds_emit_nothing() {
        let mutants = scan_tree("example", &tree(), &[MutantKind::InvertLogical]);
        assert!(mutants.iter().all(|m| m.kind() == MutantKind::InvertLogical));
        assert_eq!(mutants.len(), 1); // the single `&&`
    }

    #[test]
    fn test_boundary_and_negation_share_sites() {
        let mutants = scan_tree(
            "example",
            &tree(),
            &[
                MutantKind::ConditionalsBoundary,
                MutantKind::ConditionalsNegation,
            ],
        );
        // `<` and `>` each produce one candidate per kind; `==`/`!=` only
        // negate.
        let lt: Vec<_> = mutants.iter().filter(|m| m.original() == "<").collect();
        assert_eq!(lt.len(), 2);
        let eq: Vec<_> = mutants.iter().filter(|m| m.original() == "==").collect();
        assert_eq!(eq.len(), 1);
        assert_eq!(eq[0].replacement(), "!=");
    }

    #[test]
    fn test_unary_minus_is_not_arithmetic() {
        let mutants = scan_tree("example", &tree(), &[MutantKind::ArithmeticBase]);
        // The only `-` outside tests are the literal `-1`, the `-=`
        // compound and the final `-total`, none of which is a binary sub.
        assert!(mutants.iter().all(|m| m.original() != "-"));
    }

    #[test]
    fn test_invert_negatives_targets_unary_minus() {
        let mutants = scan_tree("example", &tree(), &[MutantKind::InvertNegatives]);
        assert_eq!(mutants.len(), 2); // `-1` and `-total`
        for m in &mutants {
            assert_eq!(m.original(), "-");
            assert_eq!(m.replacement(), "");
        }
    }

    #[test]
    fn test_positions_are_one_based() {
        let mutants = scan_all();
        let cont = mutants
            .iter()
            .find(|m| m.original() == "continue")
            .unwrap();
        let line_in_source = SOURCE
            .lines()
            .position(|l| l.contains("continue"))
            .unwrap() as u32
            + 1;
        assert_eq!(cont.span().line, line_in_source);
        assert!(cont.span().column > 1);
    }

    #[test]
    fn test_enumeration_is_deterministic() {
        let a: Vec<_> = scan_all()
            .iter()
            .map(|m| (m.span().start, m.kind()))
            .collect();
        let b: Vec<_> = scan_all()
            .iter()
            .map(|m| (m.span().start, m.kind()))
            .collect();
        assert_eq!(a, b);
    }
}
