//! Live run view: `hardpy status`.

use anyhow::{Context, Result};
use console::StyledObject;
use std::path::Path;

use hardpy::config::{HardpyConfig, StorageBackend};
use hardpy::model::{RunDocument, TestStatus, fields};
use hardpy::reporter::View;

pub fn cmd_status(project_dir: &Path, config: &HardpyConfig, json: bool) -> Result<()> {
    if config.database.backend == StorageBackend::Memory {
        println!("Memory backend configured; no run is persisted.");
        return Ok(());
    }

    let reporter = config.build_reporter(project_dir)?;
    if reporter.view(View::State).get(fields::REV).is_none() {
        println!("No run recorded yet.");
        return Ok(());
    }
    let doc = reporter
        .document(View::State)
        .context("Stored run document is malformed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    print_document(&doc);
    let waiting = reporter.open_dialog_boxes();
    if !waiting.is_empty() {
        println!();
        for (module_id, case_id) in waiting {
            println!(
                "{} {}::{}",
                console::style("Waiting for operator:").yellow().bold(),
                module_id,
                case_id
            );
        }
    }
    Ok(())
}

fn print_document(doc: &RunDocument) {
    println!();
    println!("{}", console::style(format!("Run: {}", doc.name)).bold());
    println!("Status:   {}", styled(doc.status));
    println!("Progress: {}%", doc.progress);
    if let Some(serial) = &doc.dut.serial_number {
        println!("DUT:      {}", serial);
    }
    if let Some(stand) = &doc.test_stand.name {
        println!("Stand:    {}", stand);
    }
    if let Some(failed) = &doc.caused_dut_failure_id {
        println!("First failure: {}", console::style(failed).red());
    }
    if !doc.alert.is_empty() {
        println!("Alert:    {}", console::style(&doc.alert).yellow());
    }
    println!();

    for (module_id, module) in &doc.modules {
        println!("{} [{}]", console::style(module_id).bold(), styled(module.status));
        for (case_id, case) in &module.cases {
            let attempt = if case.attempt > 1 {
                format!(" (attempt {})", case.attempt)
            } else {
                String::new()
            };
            println!("  {:<32} {}{}", case_id, styled(case.status), attempt);
            if let Some(msg) = &case.assertion_msg {
                println!("    {}", console::style(msg).dim());
            }
        }
    }
}

fn styled(status: TestStatus) -> StyledObject<&'static str> {
    let text = console::style(status.as_str());
    match status {
        TestStatus::Passed => text.green(),
        TestStatus::Failed | TestStatus::Error => text.red(),
        TestStatus::Skipped | TestStatus::Stopped => text.yellow(),
        TestStatus::Run => text.cyan(),
        TestStatus::Ready => text.dim(),
    }
}
