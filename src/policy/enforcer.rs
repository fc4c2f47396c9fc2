//! Static policy decision: runs after the scan and before any execution.

use std::collections::BTreeSet;

use crate::error::PolicyViolation;
use crate::policy::allow_list::AllowList;

/// Reject scripts that import outside the allow-list or never bind the output.
///
/// Unauthorized imports are reported first, listing every offender.
pub fn check(
    imports: &BTreeSet<String>,
    allow_list: &AllowList,
    binds_output: bool,
    output: &str,
) -> Result<(), PolicyViolation> {
    let names: Vec<String> = imports
        .iter()
        .filter(|module| !allow_list.permits(module))
        .cloned()
        .collect();
    if !names.is_empty() {
        return Err(PolicyViolation::UnauthorizedImports {
            names,
            allowed: allow_list.names(),
        });
    }
    if !binds_output {
        return Err(PolicyViolation::MissingOutputBinding {
            output: output.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_allowed_imports_pass() {
        let allow = AllowList::new(["json", "oci"]);
        assert!(check(&set(&["json", "oci.core"]), &allow, true, "result").is_ok());
        assert!(check(&set(&[]), &allow, true, "result").is_ok());
    }

    #[test]
    fn test_every_offender_is_reported() {
        let allow = AllowList::new(["json"]);
        let err = check(&set(&["subprocess", "json", "os"]), &allow, true, "result").unwrap_err();
        assert_eq!(
            err,
            PolicyViolation::UnauthorizedImports {
                names: vec!["os".into(), "subprocess".into()],
                allowed: vec!["json".into()],
            }
        );
    }

    #[test]
    fn test_imports_checked_before_output_binding() {
        let allow = AllowList::new(["json"]);
        let err = check(&set(&["os"]), &allow, false, "result").unwrap_err();
        assert!(matches!(err, PolicyViolation::UnauthorizedImports { .. }));
    }

    #[test]
    fn test_missing_output_binding() {
        let allow = AllowList::new(["json"]);
        let err = check(&set(&["json"]), &allow, false, "answer").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Code must set a 'answer' variable with the query output"
        );
    }
}
