use arch_lint::rules::{NoErrorSwallowing, NoSilentResultDrop, NoUnwrapExpect};
use arch_lint::{Analyzer, Severity};

fn workspace_root() -> &'static std::path::Path {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
}

/// Runs AL001 (no-unwrap-expect), AL003 (no-error-swallowing) and AL013
/// (no-silent-result-drop) against the workspace crates. `tests/`
/// directories are skipped; `#[cfg(test)]` modules inside `src/`
/// are exempt from AL001 and AL013 but still checked for swallowed errors.
#[test]
fn arch_lint_al001_al003_al013() {
    let analyzer = Analyzer::builder()
        .root(workspace_root())
        .exclude("**/target/**")
        .exclude("**/tests/**")
        .exclude("examples/**")
        .rule(NoUnwrapExpect::new())
        .rule(NoErrorSwallowing::new())
        .rule(NoSilentResultDrop::new())
        .build()
        .expect("build analyzer");

    let result = analyzer.analyze().expect("analyze");

    if result.has_violations_at(Severity::Warning) {
        let report = result.format_test_report(Severity::Warning);
        panic!("{report}");
    }
}
