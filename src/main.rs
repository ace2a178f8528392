use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use fs_err as fs;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use magic_block::blocks::custom::{CustomBlockDefinition, CustomBlockStore};
use magic_block::cli::{self, BlockCommand, Command, RunArgs, TemplateCommand};
use magic_block::config::Config;
use magic_block::errors::AppError;
use magic_block::provider::{self, ExecutionRequest};
use magic_block::queue::{TaskQueue, TaskStatus};
use magic_block::templates::{self, presets, TemplateStore};
use magic_block::{log, ux, Compiler, Workspace};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    log::init(args.debug);

    let mut cfg = Config::load(args.config.as_deref())?;
    if let Some(store) = &args.store {
        cfg.store_dir = store.clone();
    }
    cfg.save_runs |= args.save_runs;
    tracing::debug!(store = %cfg.store_dir.display(), demo = cfg.demo_mode(), "config loaded");

    let custom_store = CustomBlockStore::new(&cfg.store_dir);

    match args.command {
        Command::Compile { file, strict } => {
            let compiler = session_compiler(&custom_store)?;
            let ws = Workspace::load(&file)?;
            if strict {
                println!("{}", compiler.try_compile(&ws.blocks)?);
            } else {
                let out = compiler.compile_workspace(&ws);
                ux::print_diagnostics(&out.diagnostics);
                println!("{}", out.prompt);
            }
        }
        Command::Run(run_args) => run(&cfg, &custom_store, run_args).await?,
        Command::Kinds => {
            let compiler = session_compiler(&custom_store)?;
            ux::print_kinds(compiler.registry().kinds());
        }
        Command::Template(cmd) => template(&cfg, &custom_store, cmd)?,
        Command::Block(cmd) => block(&custom_store, cmd)?,
    }
    Ok(())
}

/// Builtin kinds plus whatever custom blocks are currently stored.
fn session_compiler(store: &CustomBlockStore) -> Result<Compiler> {
    let defs = store
        .list()
        .with_context(|| format!("failed to load custom blocks from {}", store.path().display()))?;
    Ok(Compiler::with_custom_blocks(&defs))
}

fn write_or_print(text: &str, out: Option<&Path>) -> Result<()> {
    match out {
        Some(p) => {
            fs::write(p, text)?;
            println!("wrote {}", p.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

async fn run(cfg: &Config, custom_store: &CustomBlockStore, args: RunArgs) -> Result<()> {
    let compiler = session_compiler(custom_store)?;
    let executor = provider::make_executor(cfg)?;
    if cfg.demo_mode() {
        eprintln!("{}", "demo mode: set NOVALLM_API_URL to reach a real endpoint".yellow());
    }

    let mut submitted: Vec<(Uuid, PathBuf, ExecutionRequest)> = Vec::new();
    let queue = TaskQueue::new(executor.clone());
    for file in &args.files {
        let ws = Workspace::load(file)?;
        let compiled = compiler.compile_workspace(&ws);
        ux::print_diagnostics(&compiled.diagnostics);
        if compiled.prompt.trim().is_empty() {
            eprintln!("{} {} compiles to an empty prompt, skipped", "warning:".yellow().bold(), file.display());
            continue;
        }

        let prompt = if args.optimize {
            provider::optimize_prompt(executor.as_ref(), &compiled.prompt).await
        } else {
            compiled.prompt
        };

        let id = Uuid::new_v4();
        let req = ExecutionRequest::new(prompt);
        queue.submit(id, req.clone());
        submitted.push((id, file.clone(), req));
    }

    if args.progress && !submitted.is_empty() {
        track_progress(&queue, &submitted).await;
    }

    let tasks = queue.wait_all().await;
    let mut failed = 0usize;
    for task in &tasks {
        if let Some((_, file, req)) = submitted.iter().find(|(id, _, _)| *id == task.id) {
            println!("\n{}", file.display().to_string().bold());
            if cfg.save_runs {
                if let Some(outcome) = task.outcome() {
                    let saved = log::save_run(&cfg.store_dir, task.id, req, &outcome)?;
                    tracing::info!(dir = %saved.dir.display(), "run saved");
                }
            }
        }
        ux::print_outcome(task);
        if task.status == TaskStatus::Failed {
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(AppError::Execution(format!("{failed} of {} tasks failed", tasks.len())).into());
    }
    Ok(())
}

async fn track_progress(queue: &TaskQueue, submitted: &[(Uuid, PathBuf, ExecutionRequest)]) {
    let multi = MultiProgress::new();
    let style = ProgressStyle::with_template("{spinner} {prefix:.bold} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let bars: Vec<(Uuid, ProgressBar)> = submitted
        .iter()
        .map(|(id, file, _)| {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(style.clone());
            pb.set_prefix(file.display().to_string());
            pb.enable_steady_tick(Duration::from_millis(120));
            (*id, pb)
        })
        .collect();

    loop {
        let mut pending = 0usize;
        for (id, pb) in &bars {
            let Some(task) = queue.get(*id) else { continue };
            if pb.is_finished() {
                continue;
            }
            match task.status {
                TaskStatus::Completed => pb.finish_with_message("completed".green().to_string()),
                TaskStatus::Failed => pb.finish_with_message("failed".red().to_string()),
                status => {
                    pending += 1;
                    pb.set_message(format!("{status:?} {}%", task.progress).to_lowercase());
                }
            }
        }
        if pending == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn template(cfg: &Config, custom_store: &CustomBlockStore, cmd: TemplateCommand) -> Result<()> {
    let store = TemplateStore::new(&cfg.store_dir);
    match cmd {
        TemplateCommand::Save { file, name } => {
            let ws = Workspace::load(&file)?;
            let prompt = session_compiler(custom_store)?.compile(&ws.blocks);
            let key = store.save(&name, &ws, &prompt)?;
            println!("模板已儲存！ {}", key.dimmed());
        }
        TemplateCommand::List => ux::print_templates(&store.list()?),
        TemplateCommand::Show { key } => {
            let t = store.load(&key)?;
            println!("{}  ({})\n", t.name.bold(), t.saved_at.format("%Y-%m-%d %H:%M:%S"));
            println!("{}", t.prompt);
        }
        TemplateCommand::Load { key, out } => {
            let t = store.load(&key)?;
            write_or_print(&t.workspace.to_json_pretty()?, out.as_deref())?;
        }
        TemplateCommand::Delete { key, yes } => {
            if !yes && !ux::confirm(&format!("Delete template {key}?")) {
                println!("Aborted by user.");
                return Ok(());
            }
            if !store.delete(&key)? {
                return Err(AppError::Store(format!("no saved template {key}")).into());
            }
            println!("deleted {key}");
        }
        TemplateCommand::Preset { id: None, .. } => ux::print_presets(&presets::all()),
        TemplateCommand::Preset { id: Some(id), out } => {
            let preset = presets::find(&id)
                .ok_or_else(|| AppError::Store(format!("unknown preset {id}")))?;
            write_or_print(&preset.workspace.to_json_pretty()?, out.as_deref())?;
        }
        TemplateCommand::Export { file, out } => {
            let ws = Workspace::load(&file)?;
            write_or_print(&templates::export_shared(&ws)?, out.as_deref())?;
        }
        TemplateCommand::Import { file, name } => {
            let ws = templates::import_shared(&fs::read_to_string(&file)?)?;
            let prompt = session_compiler(custom_store)?.compile(&ws.blocks);
            let key = store.save(&name, &ws, &prompt)?;
            println!("imported as {}", key.dimmed());
        }
    }
    Ok(())
}

fn block(store: &CustomBlockStore, cmd: BlockCommand) -> Result<()> {
    match cmd {
        BlockCommand::Add { name, icon, color } => {
            let def = CustomBlockDefinition::create(&name, icon.as_deref(), color.as_deref())?;
            let def = store.add(def)?;
            println!("{} {} → kind {}", def.icon, def.name.bold(), def.kind_id());
        }
        BlockCommand::List => ux::print_custom_blocks(&store.list()?),
        BlockCommand::Remove { id } => {
            if !store.remove(&id)? {
                return Err(AppError::Store(format!("no custom block {id}")).into());
            }
            println!("removed {id}");
        }
    }
    Ok(())
}
