use std::path::{Path, PathBuf};

use concord_core::config::Config;
use concord_workflows::WorkflowContext;
use serde_json::json;

/// `concord doctor` (§10.6): connectivity + configuration sanity check,
/// grounded on the teacher's `at-cli::commands::doctor` report shape —
/// a per-check `ok` flag, a `failures` tally, and optional `--json`/`--out`.
pub async fn run(config: &Config, ctx: &WorkflowContext, strict: bool, json_output: bool, out_path: Option<&str>) -> anyhow::Result<()> {
    let mut failures = 0usize;

    let huly_check = health_check("huly", ctx.trackers.huly.health_check().await, &mut failures);
    let vibe_check = health_check("vibe", ctx.trackers.vibe.health_check().await, &mut failures);

    let beads_checks: Vec<_> = config
        .beads
        .repo_paths
        .iter()
        .map(|repo_path| {
            let exists = Path::new(repo_path).join("issues.jsonl").exists();
            if !exists {
                failures += 1;
            }
            json!({ "repo_path": repo_path, "issues_jsonl_present": exists })
        })
        .collect();

    let store_path = Path::new(&config.store.path);
    let store_reachable = store_path.parent().map(|p| p.as_os_str().is_empty() || p.exists()).unwrap_or(true);
    if !store_reachable {
        failures += 1;
    }

    let result = json!({
        "huly": huly_check,
        "vibe": vibe_check,
        "beads": beads_checks,
        "store_path": config.store.path,
        "store_directory_reachable": store_reachable,
        "bridge_listen": format!("{}:{}", config.bridge.host, config.bridge.port),
        "failures": failures,
    });

    if json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("concord doctor report");
        println!("{}", "-".repeat(40));
        println!("Huly:  {}", if huly_check["ok"].as_bool().unwrap_or(false) { "ok" } else { "failed" });
        println!("Vibe:  {}", if vibe_check["ok"].as_bool().unwrap_or(false) { "ok" } else { "failed" });
        for check in &beads_checks {
            println!(
                "Beads: {} ({})",
                check["repo_path"].as_str().unwrap_or("?"),
                if check["issues_jsonl_present"].as_bool().unwrap_or(false) {
                    "present"
                } else {
                    "missing"
                }
            );
        }
        println!("Store: {} ({})", config.store.path, if store_reachable { "reachable" } else { "unreachable" });
        println!("Failures: {failures}");
    }

    if let Some(path) = out_path {
        write_json_artifact(path, &result)?;
    }

    if strict && failures > 0 {
        anyhow::bail!("doctor checks failed ({failures} issues)");
    }

    Ok(())
}

fn health_check(name: &str, result: concord_core::error::Result<()>, failures: &mut usize) -> serde_json::Value {
    match result {
        Ok(()) => json!({ "ok": true }),
        Err(err) => {
            *failures += 1;
            json!({ "ok": false, "tracker": name, "error": err.to_string() })
        }
    }
}

fn write_json_artifact(path: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    let out_path = PathBuf::from(path);
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(out_path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}
