//! Demo background worker: captures a few commands, then replays them on a worker thread.
//!
//! Configured through `REIFY_*` environment variables; see `WorkerConfig::from_env`.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use tracing::{info, warn};

use reify_core::{DomainObject, UserMemento, Value};
use reify_demo::{Customer, Invoice, Order};
use reify_metamodel::{Arg, ObjectArg};
use reify_runtime::{
    BackgroundService, BackgroundWorker, CommandExecutor, CommandRepository, InMemoryCommandRepository,
    InMemoryObjectStore, InteractionService, ObjectStore, RepositoryCommandSource, WorkerConfig,
};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env().context("invalid worker configuration")?;
    reify_observability::init(config.log_format);

    let metamodel = Arc::new(reify_demo::metamodel().context("failed to build the demo metamodel")?);
    let store = InMemoryObjectStore::arc();
    let repo = InMemoryCommandRepository::arc();

    let invoice = Invoice::new("INV-1001", 420.0);
    let customer = Customer::new("C-7", "Globex");
    let order = Order::new("SO-88", 1200.0);
    for object in [
        Box::new(invoice.clone()) as Box<dyn DomainObject>,
        Box::new(customer.clone()),
        Box::new(order.clone()),
    ] {
        store.insert(object).context("failed to seed demo data")?;
    }

    // Capture: nothing below runs until the worker picks it up.
    let interactions = InteractionService::new(metamodel.clone(), repo.clone());
    let background = BackgroundService::new(metamodel.clone(), repo.clone());
    let mut interaction = interactions.open(UserMemento::new("alice"));
    background
        .proxy(&invoice)
        .invoke(&mut interaction, "approve", &[])?;
    background.proxy(&invoice).invoke(
        &mut interaction,
        "assignCustomer",
        &[Arg::Object(ObjectArg::new(Arc::new(customer)))],
    )?;
    background
        .proxy(&invoice)
        .invoke(&mut interaction, "remind", &[Arg::from(Value::from("email"))])?;
    background.proxy(&order).invoke(
        &mut interaction,
        "applyDiscount",
        &[Arg::from(Value::Double(12.5))],
    )?;
    // Fails on replay: the invoice is approved by then.
    background
        .proxy(&invoice)
        .invoke(&mut interaction, "approve", &[])?;
    let parent = interactions.close(interaction)?;
    info!(interaction_id = %parent.interaction_id(), "demo commands captured");

    // Replay.
    let executor = CommandExecutor::new(metamodel, store.clone(), repo.clone())
        .with_sudo_policy(config.sudo_policy);
    let source = RepositoryCommandSource::new(repo.clone(), executor).with_batch_size(config.batch_size);
    let handle = BackgroundWorker::new(source)
        .spawn(config.clone())
        .context("failed to spawn the background worker")?;

    let deadline = Instant::now() + DRAIN_TIMEOUT;
    let drained = loop {
        let stats = repo.stats()?;
        if stats.pending == 0 && stats.running == 0 {
            break true;
        }
        if Instant::now() >= deadline {
            break false;
        }
        thread::sleep(config.poll_interval.min(Duration::from_millis(50)));
    };

    let worker_stats = handle.stats();
    handle.shutdown();
    info!(stats = %serde_json::to_string(&worker_stats)?, "worker finished");

    for child in repo.find_by_parent(parent.interaction_id())? {
        match child.exception() {
            None => info!(
                sequence = child.sequence(),
                member = %child.member_identifier().map(ToString::to_string).unwrap_or_default(),
                result = ?child.result().map(ToString::to_string),
                "command succeeded"
            ),
            Some(exception) => warn!(
                sequence = child.sequence(),
                member = %child.member_identifier().map(ToString::to_string).unwrap_or_default(),
                exception,
                "command failed"
            ),
        }
    }

    if !drained {
        bail!("commands still pending after {:?}", DRAIN_TIMEOUT);
    }
    Ok(())
}
