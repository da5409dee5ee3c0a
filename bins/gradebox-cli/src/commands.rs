// CLI commands for browsing the catalog and grading submissions
use anyhow::{bail, Context, Result};
use gradebox_common::catalog::Catalog;
use gradebox_common::types::{EntryPoint, ExecutionResult, Language, RunStatus, TestCase};
use gradebox_engine::{Engine, LanguageConfigManager, RunRequest};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// List all catalog challenges
pub fn list_challenges(catalog: &Catalog) {
    if catalog.is_empty() {
        println!("No challenges in catalog.");
        return;
    }

    println!("📋 Challenges:\n");
    println!("{:<20} {:<24} {:<8} {:<12} {:<6}", "ID", "TITLE", "LEVEL", "LANGUAGE", "TESTS");
    println!("{}", "─".repeat(74));

    for challenge in catalog.list() {
        println!(
            "{:<20} {:<24} {:<8} {:<12} {:<6}",
            challenge.id,
            challenge.title,
            format!("{:?}", challenge.difficulty).to_lowercase(),
            challenge.language,
            challenge.test_cases.len()
        );
    }

    println!("\n✅ Total: {} challenge(s)", catalog.len());
}

/// Print one challenge in full
pub fn show_challenge(catalog: &Catalog, id: &str) -> Result<()> {
    let Some(challenge) = catalog.get(id) else {
        bail!("Challenge Not Found: '{}'", id);
    };

    println!("📝 {} ({})", challenge.title, challenge.id);
    println!(
        "   {:?} · {}{}",
        challenge.difficulty,
        challenge.language,
        challenge
            .time_limit
            .map(|secs| format!(" · {}s time limit", secs))
            .unwrap_or_default()
    );
    if let Some(entry) = &challenge.entry_point {
        println!("   Entry point: {}", entry);
    }
    println!("\n{}\n", challenge.description);

    println!("Starter code:");
    for line in challenge.starter_code.lines() {
        println!("    {}", line);
    }

    println!("\nTest cases:");
    for (idx, test_case) in challenge.test_cases.iter().enumerate() {
        println!(
            "  {}. {} → {}{}",
            idx + 1,
            display_input(&test_case.input),
            test_case.expected_output,
            if test_case.hidden { "  (hidden)" } else { "" }
        );
    }

    if !challenge.hints.is_empty() {
        println!("\n💡 Hints:");
        for hint in &challenge.hints {
            println!("  - {}", hint);
        }
    }

    Ok(())
}

/// Grade `file` against a catalog challenge. Returns whether every test passed.
pub async fn run_challenge(
    engine: &Engine,
    catalog: &Catalog,
    id: &str,
    file: &Path,
    json: bool,
) -> Result<bool> {
    let Some(challenge) = catalog.get(id) else {
        bail!("Challenge Not Found: '{}'", id);
    };
    let source = read_source(file)?;

    if !json {
        println!("🚀 Running {} against '{}' ({} backend)...\n", file.display(), challenge.title, engine.backend_name());
    }

    let result = engine.run_challenge(challenge, &source).await;
    report(&result, json)
}

/// Run `file` with optional ad-hoc test cases
pub async fn exec(
    engine: &Engine,
    language: Language,
    file: &Path,
    entry: Option<EntryPoint>,
    cases: Option<&Path>,
    timeout_ms: Option<u64>,
    json: bool,
) -> Result<bool> {
    let source = read_source(file)?;

    let mut request = RunRequest::new(language, source);
    if let Some(path) = cases {
        request = request.with_test_cases(load_test_cases(path)?);
    }
    if let Some(entry) = entry {
        request = request.with_entry_point(entry);
    }
    if let Some(ms) = timeout_ms {
        if ms == 0 {
            bail!("--timeout-ms must be greater than zero");
        }
        request = request.with_timeout(Duration::from_millis(ms));
    }

    if !json {
        println!("🚀 Running {} as {} ({} backend)...\n", file.display(), language, engine.backend_name());
    }

    let result = engine.run(request).await;
    report(&result, json)
}

/// List configured language runtimes
pub fn list_languages(languages: &LanguageConfigManager) -> Result<()> {
    println!("📋 Configured Languages:\n");
    println!(
        "{:<12} {:<10} {:<24} {:<20} {:<10}",
        "LANGUAGE", "VERSION", "IMAGE", "COMMAND", "LIMITS"
    );
    println!("{}", "─".repeat(84));

    for name in languages.list_languages() {
        let language: Language = name.parse()?;
        let config = languages.get_config(&language)?;
        println!(
            "{:<12} {:<10} {:<24} {:<20} {:.1}/{} MB",
            config.name,
            config.version,
            config.image,
            config.execution.command,
            config.cpu_limit,
            config.memory_limit_mb
        );
    }

    println!("\n✅ Total: {} language(s)", languages.list_languages().len());
    Ok(())
}

fn read_source(file: &Path) -> Result<String> {
    fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

fn load_test_cases(path: &Path) -> Result<Vec<TestCase>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse test cases in {}", path.display()))
}

fn report(result: &ExecutionResult, json: bool) -> Result<bool> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(result).context("Failed to serialize result")?
        );
    } else {
        print!("{}", format_result(result));
    }
    Ok(verdict(result))
}

/// A run passes when it completed and, if it had tests, all of them passed
fn verdict(result: &ExecutionResult) -> bool {
    result
        .completion_report()
        .map_or(result.success, |report| report.passed)
}

fn display_input(input: &str) -> &str {
    if input.trim().is_empty() {
        "(no arguments)"
    } else {
        input
    }
}

fn format_result(result: &ExecutionResult) -> String {
    let mut out = String::new();

    if !result.output.is_empty() {
        let _ = writeln!(out, "Output:");
        for line in result.output.lines() {
            let _ = writeln!(out, "  │ {}", line);
        }
        let _ = writeln!(out);
    }

    let error = result.error.as_deref().unwrap_or_default();
    match result.status {
        RunStatus::Completed => {}
        RunStatus::Faulted => {
            let _ = writeln!(out, "✗ Runtime error: {}", error);
        }
        RunStatus::TimedOut => {
            let _ = writeln!(out, "⏱ {}", error);
        }
        RunStatus::EngineError => {
            let _ = writeln!(out, "⚠ {}", error);
        }
    }

    if let Some(tests) = &result.test_results {
        for (idx, test) in tests.iter().enumerate() {
            if test.passed {
                let _ = writeln!(out, "  ✓ Test {}: {} → {}", idx + 1, display_input(&test.input), test.actual.trim());
            } else {
                let _ = writeln!(
                    out,
                    "  ✗ Test {}: {} → expected {}, got {}",
                    idx + 1,
                    display_input(&test.input),
                    test.expected.trim(),
                    test.actual.trim()
                );
            }
        }
        let _ = writeln!(
            out,
            "\nScore: {}% ({}/{} passed)",
            result.score(),
            result.passed_count(),
            result.total_count()
        );
    }

    if let Some(ms) = result.execution_time_ms {
        let _ = writeln!(out, "Time: {}ms", ms);
    }

    out
}
