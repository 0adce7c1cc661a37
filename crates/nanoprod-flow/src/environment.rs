//! One-time environment preparation for customisation hooks.
//!
//! A customisation hook of the form `pkg/subpkg/module.function` refers to a
//! module the conversion engine resolves under
//! `$CMSSW_BASE/src/pkg/subpkg/python/module.py`. Grid jobs ship the module
//! in their sandbox instead, so before the first conversion the module is
//! staged into the engine's search location if it is not already there.
//!
//! The step is idempotent: once the target file exists, later calls do
//! nothing. Hook names in any other shape are passed through to the engine
//! uninterpreted.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Parsed `pkg/subpkg/module.function` hook reference.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HookPath {
    package: String,
    subpackage: String,
    module: String,
}

/// Splits a hook name into its package path, if it has the canonical
/// 3-segment form. Anything else is not resolvable locally.
fn parse_hook(hook: &str) -> Option<HookPath> {
    let (path, _function) = hook.split_once('.')?;
    let segments: Vec<&str> = path.split('/').collect();
    match segments.as_slice() {
        [package, subpackage, module]
            if !package.is_empty() && !subpackage.is_empty() && !module.is_empty() =>
        {
            Some(HookPath {
                package: (*package).to_string(),
                subpackage: (*subpackage).to_string(),
                module: (*module).to_string(),
            })
        }
        _ => None,
    }
}

/// Stages the hook's module file into the engine search location.
///
/// Returns the path of the module in the engine's search location if the
/// hook is resolvable, `None` if the hook name is passed through
/// uninterpreted or the module is not available locally.
///
/// Postcondition: on `Ok(Some(path))`, `path` exists and later calls with
/// the same arguments are no-ops.
///
/// # Errors
/// Returns an IO error if the target directory or file cannot be created.
pub fn prepare_customisation(
    hook: &str,
    sandbox_dir: &Path,
    cmssw_base: &Path,
) -> Result<Option<PathBuf>> {
    let Some(parsed) = parse_hook(hook) else {
        tracing::debug!(hook, "customisation hook passed through uninterpreted");
        return Ok(None);
    };

    let module_file = format!("{}.py", parsed.module);
    let target_dir = cmssw_base
        .join("src")
        .join(&parsed.package)
        .join(&parsed.subpackage)
        .join("python");
    let target = target_dir.join(&module_file);

    if target.exists() {
        return Ok(Some(target));
    }

    let sandbox_file = sandbox_dir.join(&module_file);
    if !sandbox_file.exists() {
        tracing::debug!(
            hook,
            sandbox = %sandbox_file.display(),
            "customisation module not in sandbox; leaving resolution to the engine"
        );
        return Ok(None);
    }

    std::fs::create_dir_all(&target_dir)?;
    std::fs::copy(&sandbox_file, &target)?;
    tracing::info!(
        hook,
        target = %target.display(),
        "staged customisation module into engine search path"
    );
    Ok(Some(target))
}
