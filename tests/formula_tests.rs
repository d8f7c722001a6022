mod common;

use buildscore::attr::Attr;
use buildscore::FormulaError;
use common::{approx, build, caster};

// ============================================================================
// Validation Through A Build
// ============================================================================

#[test]
fn test_validate_missing_operand() {
    let build = build();
    assert!(matches!(
        build.validate_ast("攻击 +"),
        Err(FormulaError::MissingOperand { .. })
    ));
}

#[test]
fn test_validate_unterminated_group() {
    let build = build();
    assert!(matches!(
        build.validate_ast("(10+20"),
        Err(FormulaError::Unterminated { .. })
    ));
}

#[test]
fn test_validate_unknown_identifier() {
    let build = build();
    let err = build.validate_ast("伤害 * 神秘系数").unwrap_err();
    assert_eq!(
        err,
        FormulaError::UnknownIdentifier {
            namespace: None,
            name: "神秘系数".into()
        }
    );
}

#[test]
fn test_validate_unknown_function() {
    let build = build();
    assert!(matches!(
        build.validate_ast("sqrt(攻击)"),
        Err(FormulaError::UnknownFunction { .. })
    ));
}

#[test]
fn test_validate_empty() {
    assert_eq!(build().validate_ast("   "), Err(FormulaError::Empty));
}

#[test]
fn test_validate_known_vocabulary() {
    let build = caster();
    for formula in [
        "伤害",
        "DPS",
        "每持续神智每秒伤害",
        "圣咏::段数",
        "近战::伤害.暴击",
        "远程暴击 * 远程暴伤",
        "max(攻击, 生命) // 10",
        "-威力 % 3",
        "log(攻击, 10) + power(2, 3)",
    ] {
        assert!(build.validate_ast(formula).is_ok(), "{formula}");
    }
}

// ============================================================================
// Evaluation Against Substitute Attributes
// ============================================================================

#[test]
fn test_evaluate_with_substitute_attrs() {
    let build = build();
    let mut attrs = build.calculate_attributes();
    assert_eq!(build.evaluate_ast("攻击 * 2", &attrs).unwrap(), 300.0);

    attrs.set(Attr::Attack, 500.0);
    assert_eq!(build.evaluate_ast("攻击 * 2", &attrs).unwrap(), 1000.0);
    // weapon damage reads the substituted elemental attack as well
    let damage = build.evaluate_ast("伤害", &attrs).unwrap();
    assert!(approx(damage, (400.0 + 500.0) * 1.2));
}

#[test]
fn test_evaluate_parse_error_propagates() {
    let build = build();
    let attrs = build.calculate_attributes();
    assert!(build.evaluate_ast("1 +", &attrs).is_err());
}

#[test]
fn test_division_by_zero_is_zero() {
    let build = build();
    let attrs = build.calculate_attributes();
    assert_eq!(build.evaluate_ast("攻击 / 0", &attrs).unwrap(), 0.0);
}

#[test]
fn test_identifier_names() {
    let build = build();
    let names = build
        .identifier_names("伤害 * 攻击 + 近战::暴击 + 攻击")
        .unwrap();
    assert_eq!(names, vec!["伤害", "攻击", "近战::暴击"]);
}
