use anyhow::{anyhow, Result};
use kuchiki::NodeRef;

use crate::bridge::PageBridge;
use crate::script::{ScriptDescriptor, ScriptExecution, ScriptKind, ScriptSource};

#[derive(Debug, Clone, Copy)]
pub struct ScriptExecutionSummary {
    pub executed_scripts: usize,
    pub failed_scripts: usize,
}

/// Collect `<script>` elements from the parsed document, in document order.
pub fn collect_scripts(document: &NodeRef) -> Result<Vec<ScriptDescriptor>> {
    let selection = document
        .select("script")
        .map_err(|()| anyhow!("failed to compile script selector"))?;

    let mut collected = Vec::new();
    for (index, script) in selection.enumerate() {
        let attributes = script.attributes.borrow();
        let kind = classify_kind(attributes.get("type"));
        let execution = determine_execution(&attributes, kind);

        if let Some(src) = attributes
            .get("src")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
        {
            collected.push(ScriptDescriptor {
                index,
                kind,
                execution,
                source: ScriptSource::External {
                    src: src.to_string(),
                },
            });
            continue;
        }

        drop(attributes);
        let code = script.text_contents();
        if code.trim().is_empty() {
            continue;
        }
        collected.push(ScriptDescriptor {
            index,
            kind,
            execution,
            source: ScriptSource::Inline { code },
        });
    }

    Ok(collected)
}

fn classify_kind(script_type: Option<&str>) -> ScriptKind {
    match script_type {
        Some(value) => {
            let lowered = value.trim().to_ascii_lowercase();
            match lowered.as_str() {
                "" | "text/javascript" | "application/javascript" => ScriptKind::Classic,
                "module" | "text/javascript+module" => ScriptKind::Module,
                other => {
                    if other == "text/ecmascript" || other == "application/ecmascript" {
                        ScriptKind::Classic
                    } else {
                        ScriptKind::Unknown
                    }
                }
            }
        }
        None => ScriptKind::Classic,
    }
}

fn determine_execution(attributes: &kuchiki::Attributes, kind: ScriptKind) -> ScriptExecution {
    if attributes.get("async").is_some() {
        return ScriptExecution::Async;
    }
    if attributes.get("defer").is_some() {
        return ScriptExecution::Defer;
    }
    match kind {
        ScriptKind::Module => ScriptExecution::Defer,
        _ => ScriptExecution::Blocking,
    }
}

pub(crate) fn filter_inline_classic(scripts: &[ScriptDescriptor]) -> Vec<ScriptDescriptor> {
    scripts
        .iter()
        .filter(|descriptor| matches!(descriptor.source, ScriptSource::Inline { .. }))
        .filter(|descriptor| descriptor.kind == ScriptKind::Classic)
        .filter(|descriptor| descriptor.execution == ScriptExecution::Blocking)
        .cloned()
        .collect()
}

/// Run each inline script body in order. A script failing is reported at the
/// bridge boundary and does not prevent the scripts after it from running.
pub(crate) fn run_inline_scripts(
    bridge: &PageBridge,
    scripts: &[ScriptDescriptor],
) -> ScriptExecutionSummary {
    let mut executed = 0usize;
    let mut failed = 0usize;

    for descriptor in scripts {
        let label = format!("inline-script-{}.js", descriptor.index);
        let source = match &descriptor.source {
            ScriptSource::Inline { code } => code,
            ScriptSource::External { .. } => continue,
        };

        if bridge.load_script(source, &label) {
            executed += 1;
        } else {
            failed += 1;
        }
    }

    ScriptExecutionSummary {
        executed_scripts: executed,
        failed_scripts: failed,
    }
}
