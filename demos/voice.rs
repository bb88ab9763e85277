use std::sync::{Arc, Mutex};

use anyhow::Context;
use tracing::Level;
use tracing_subscriber::fmt::time::ChronoLocal;

use planvoice::types::plan::Task;
use planvoice::{Config, LiveSession, PlanStore};

/// In-memory plan, printed after every mutation.
struct MemoryPlan {
    tasks: Mutex<Vec<Task>>,
}

impl PlanStore for MemoryPlan {
    fn current_plan(&self) -> Vec<Task> {
        self.tasks.lock().map(|t| t.clone()).unwrap_or_default()
    }

    fn apply(&self, tasks: Vec<Task>) {
        println!("--- plan ({} tasks) ---", tasks.len());
        for task in &tasks {
            println!("[{:?}] {} ({} subtasks)", task.status, task.title, task.subtasks.len());
        }
        if let Ok(mut current) = self.tasks.lock() {
            *current = tasks;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv_override().ok();

    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let config = Config::from_env();
    let store = Arc::new(MemoryPlan {
        tasks: Mutex::new(vec![]),
    });

    let mut session = LiveSession::new(config, store);
    let mut errors = session
        .take_error_receiver()
        .context("error receiver already taken")?;
    tokio::spawn(async move {
        while let Some(e) = errors.recv().await {
            eprintln!("session error: {}", e);
        }
    });

    session.connect().await.context("failed to connect")?;
    println!("connected, state={:?}", session.connection_state());

    session
        .start_listening()
        .context("failed to start listening")?;
    println!("listening... speak to edit the plan, ctrl-c to quit");

    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(2));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let user = session.user_transcript();
                let ai = session.ai_transcript();
                if !user.is_empty() {
                    println!("you: {}", user);
                }
                if !ai.is_empty() {
                    println!("assistant: {}", ai);
                }
            }
        }
    }

    println!("closing session");
    session.close();
    Ok(())
}
