//! Batch-demo command implementation.
//!
//! Runs the same two statements twice: once with auto-commit and once inside
//! one explicit transaction. The first sets `last_name` to `"X"`; the second
//! names a column that does not exist.

use reservo_core::{CoreResult, TransactionManager};
use reservo_executor::{Connector, InMemoryEngine, Statement, StatementExecutor, Value};
use reservo_testkit::employees_engine;
use serde::Serialize;
use tracing::info;

const TABLE: &str = "employees";
const ROW: &str = "1";

/// Result of one run of the two statements.
#[derive(Debug, Serialize)]
pub struct BatchRun {
    /// How the statements were run.
    pub mode: &'static str,
    /// The error the batch reported.
    pub error: Option<String>,
    /// `last_name` read back afterwards.
    pub last_name: Option<String>,
}

/// Demo report.
#[derive(Debug, Serialize)]
pub struct BatchDemoResult {
    /// `last_name` before either run.
    pub initial: String,
    /// Both runs, auto-commit first.
    pub runs: Vec<BatchRun>,
}

fn statements() -> [Statement; 2] {
    [
        Statement::update(TABLE, ROW, [("last_name", Value::text("X"))]),
        Statement::update(TABLE, ROW, [("sss", Value::text("X"))]),
    ]
}

fn reset(db: &InMemoryEngine, initial: &str) -> CoreResult<()> {
    db.connect()?.execute(&Statement::update(
        TABLE,
        ROW,
        [("last_name", Value::text(initial))],
    ))?;
    Ok(())
}

fn last_name(db: &InMemoryEngine) -> Option<String> {
    db.row(TABLE, ROW)
        .and_then(|row| row.text("last_name").map(str::to_string))
}

/// Runs both variants and returns what each left behind.
pub fn demo() -> CoreResult<BatchDemoResult> {
    let db = employees_engine();
    let initial = "Smith".to_string();
    db.connect()?.execute(&Statement::insert(
        TABLE,
        ROW,
        [
            ("first_name", Value::text("Jane")),
            ("last_name", Value::text(initial.as_str())),
        ],
    ))?;

    let mut session = TransactionManager::new(db.connect()?);

    let auto = session.execute_batch(&statements());
    info!(ok = auto.is_ok(), "auto-commit batch finished");
    let auto_run = BatchRun {
        mode: "auto-commit",
        error: auto.err().map(|e| e.to_string()),
        last_name: last_name(&db),
    };

    reset(&db, &initial)?;

    let explicit = session.run_in_transaction(|tx| {
        for statement in statements() {
            tx.execute(&statement)?;
        }
        Ok(())
    });
    info!(ok = explicit.is_ok(), "explicit transaction finished");
    let explicit_run = BatchRun {
        mode: "run_in_transaction",
        error: explicit.err().map(|e| e.to_string()),
        last_name: last_name(&db),
    };

    Ok(BatchDemoResult {
        initial,
        runs: vec![auto_run, explicit_run],
    })
}

/// Runs the batch-demo command.
pub fn run(format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = demo()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            println!("Initial last_name: {}", result.initial);
            for batch in &result.runs {
                println!("\n=== {} ===", batch.mode);
                println!("Error: {}", batch.error.as_deref().unwrap_or("none"));
                println!(
                    "last_name afterwards: {}",
                    batch.last_name.as_deref().unwrap_or("<missing>")
                );
            }
        }
    }

    Ok(())
}
