use gridscribe_common::column_to_letters;
use gridscribe_parse::{FormulaRef, extract_references, tokenize};
use proptest::prelude::*;

fn normalise(s: &str) -> String {
    s.replace('$', "").to_ascii_uppercase()
}

/// Every extracted reference must appear in the formula once anchors and
/// case are ignored. Range corners are checked individually.
fn assert_sound(formula: &str) {
    let refs = extract_references(formula).expect("formula should lex");
    let haystack = normalise(formula);
    for r in &refs.refs {
        let (sheet, corners) = match r {
            FormulaRef::Cell { sheet, address } => (sheet, vec![address.to_string()]),
            FormulaRef::Range { sheet, range } => {
                (sheet, vec![range.start.to_string(), range.end.to_string()])
            }
        };
        if let Some(sheet) = sheet {
            assert!(
                haystack.contains(&sheet.to_ascii_uppercase()),
                "sheet {sheet} missing from {formula}"
            );
        }
        for corner in corners {
            assert!(
                haystack.contains(&corner),
                "{corner} not found in {formula}"
            );
        }
    }
}

fn arb_cell() -> impl Strategy<Value = String> {
    (1u32..60, 1u32..500, any::<bool>(), any::<bool>()).prop_map(|(c, r, col_abs, row_abs)| {
        format!(
            "{}{}{}{}",
            if col_abs { "$" } else { "" },
            column_to_letters(c),
            if row_abs { "$" } else { "" },
            r
        )
    })
}

fn arb_operand() -> impl Strategy<Value = String> {
    prop_oneof![
        arb_cell(),
        (1u32..60, 1u32..500, 0u32..5, 0u32..20).prop_map(|(c, r, w, h)| {
            format!(
                "{}{}:{}{}",
                column_to_letters(c),
                r,
                column_to_letters(c + w),
                r + h
            )
        }),
        arb_cell().prop_map(|a| format!("Sheet2!{a}")),
        arb_cell().prop_map(|a| format!("'Other Sheet'!{a}")),
        arb_cell().prop_map(|a| format!("\"{a}\"")),
        Just("TaxRate".to_string()),
        (0u32..1000).prop_map(|n| n.to_string()),
        Just("TRUE".to_string()),
    ]
}

fn arb_formula() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_operand(), 1..6).prop_flat_map(|operands| {
        let n = operands.len();
        (
            Just(operands),
            prop::collection::vec(prop_oneof![Just("+"), Just("*"), Just("&")], n),
            any::<bool>(),
        )
            .prop_map(|(operands, ops, wrap)| {
                let mut body = String::new();
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        body.push_str(ops[i]);
                    }
                    body.push_str(operand);
                }
                if wrap {
                    format!("=SUM({body})")
                } else {
                    format!("={body}")
                }
            })
    })
}

proptest! {
    #[test]
    fn extracted_references_occur_in_formula(formula in arb_formula()) {
        assert_sound(&formula);
    }

    #[test]
    fn extraction_is_deterministic(formula in arb_formula()) {
        let a = extract_references(&formula).unwrap();
        let b = extract_references(&formula).unwrap();
        prop_assert_eq!(a, b);
    }
}

#[test]
fn integration_reference_free_formulas_have_no_deps() {
    for formula in ["=1+2", "=TODAY()", "=\"Sheet2!C3\"", "=PI()*2", "=#N/A"] {
        let refs = extract_references(formula).unwrap();
        assert!(refs.refs.is_empty(), "{formula} produced {:?}", refs.refs);
    }
}

#[test]
fn integration_cross_sheet_dependency_scenario() {
    let refs = extract_references("=A1*Sheet2!C3").unwrap();
    let rendered: Vec<String> = refs.refs.iter().map(ToString::to_string).collect();
    assert_eq!(rendered, ["A1", "Sheet2!C3"]);
}

#[test]
fn integration_spans_cover_formula_body() {
    let formula = "=IF(A1>=10, 'My Sheet'!B2 & \"x\", {1,2;3,4})";
    let tokens = tokenize(formula).unwrap();
    let mut cursor = 1;
    for token in &tokens {
        assert_eq!(token.start, cursor, "gap before {:?}", token);
        cursor = token.end;
    }
    assert_eq!(cursor, formula.len());
}
