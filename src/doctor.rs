use std::path::Path;
use std::sync::Arc;

use supportdesk_core::config::{AppConfig, CatalogBackend};
use supportdesk_core::event::EventBus;

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

pub async fn run_doctor(config: &AppConfig) {
    let mut checks = Vec::new();

    // 1. API key configured for the model
    checks.push(check_api_key(config));

    // 2. Catalog backend reachable and non-empty
    checks.push(check_catalog(config).await);

    // 3. Workflow graph and tool names
    checks.push(check_workflow(config));

    // 4. Trace directory writable
    checks.push(check_trace_dir(config));

    // Print results
    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
}

fn check_api_key(config: &AppConfig) -> CheckResult {
    let has_key = config
        .model
        .api_key
        .as_ref()
        .is_some_and(|k| !k.is_empty() && !k.starts_with("${"));
    let provider = &config.model.provider;
    let needs_key = supportdesk_llm::providers::presets::get_preset(provider)
        .map(|p| p.needs_api_key)
        .unwrap_or(true);

    if !needs_key || has_key {
        CheckResult {
            label: "API Key".into(),
            ok: true,
            detail: format!("Configured for {} ({})", config.model.model_id, provider),
        }
    } else {
        CheckResult {
            label: "API Key".into(),
            ok: false,
            detail: format!("No API key set for provider '{}'", provider),
        }
    }
}

async fn check_catalog(config: &AppConfig) -> CheckResult {
    let label = match config.catalog.backend {
        CatalogBackend::Sqlite => format!("Catalog (sqlite: {})", config.catalog_dir().display()),
        CatalogBackend::Mcp => "Catalog (mcp)".to_string(),
    };
    let gateway = match crate::build_catalog(config) {
        Ok(gateway) => gateway,
        Err(e) => {
            return CheckResult {
                label,
                ok: false,
                detail: e.to_string(),
            }
        }
    };
    match gateway.list_catalogs().await {
        Ok(list) if list.names.is_empty() => CheckResult {
            label,
            ok: false,
            detail: "No databases found (try `supportdesk import-csv`)".into(),
        },
        Ok(list) => CheckResult {
            label,
            ok: true,
            detail: list.names.join(", "),
        },
        Err(e) => CheckResult {
            label,
            ok: false,
            detail: e.to_string(),
        },
    }
}

fn check_workflow(config: &AppConfig) -> CheckResult {
    let built = crate::build_factory(config, Arc::new(EventBus::default()))
        .and_then(|factory| factory.build().map_err(Into::into));
    match built {
        Ok(orchestrator) => CheckResult {
            label: "Workflow".into(),
            ok: true,
            detail: format!(
                "{} agents, coordinator '{}', max {} steps",
                orchestrator.workflow().agents().len(),
                orchestrator.workflow().graph().coordinator(),
                config.workflow.max_steps
            ),
        },
        Err(e) => CheckResult {
            label: "Workflow".into(),
            ok: false,
            detail: e.to_string(),
        },
    }
}

fn check_trace_dir(config: &AppConfig) -> CheckResult {
    let Some(dir) = config.workflow.trace_dir.as_deref() else {
        return CheckResult {
            label: "Traces".into(),
            ok: true,
            detail: "Disabled".into(),
        };
    };
    let dir = Path::new(dir);
    if let Err(e) = std::fs::create_dir_all(dir) {
        return CheckResult {
            label: "Traces".into(),
            ok: false,
            detail: format!("{} (cannot create: {})", dir.display(), e),
        };
    }
    // Check writable by attempting to create a temp file
    let test_file = dir.join(".doctor_test");
    match std::fs::write(&test_file, "test") {
        Ok(_) => {
            std::fs::remove_file(&test_file).ok();
            CheckResult {
                label: "Traces".into(),
                ok: true,
                detail: format!("{}", dir.display()),
            }
        }
        Err(e) => CheckResult {
            label: "Traces".into(),
            ok: false,
            detail: format!("{} (not writable: {})", dir.display(), e),
        },
    }
}
