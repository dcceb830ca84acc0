//! Train command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::{apply_overrides, load_spec, train_from_spec, validate_config, TrainArgs};

pub fn run_train(args: TrainArgs, level: LogLevel) -> Result<(), String> {
    log(
        level,
        LogLevel::Normal,
        &format!("Afinar: Training from {}", args.config.display()),
    );

    let mut spec = load_spec(&args.config).map_err(|e| format!("Config error: {e}"))?;
    apply_overrides(&mut spec, &args);
    validate_config(&spec).map_err(|e| format!("Config error: {e}"))?;

    if args.dry_run {
        log(level, LogLevel::Normal, "Dry run - config validated successfully");
        log(
            level,
            LogLevel::Verbose,
            &format!(
                "  Epochs: {}..={}",
                spec.training.start_epoch, spec.training.num_epoch
            ),
        );
        log(
            level,
            LogLevel::Verbose,
            &format!("  Optimizer: SAM/{} (lr={})", spec.optimizer.name, spec.optimizer.lr),
        );
        log(
            level,
            LogLevel::Verbose,
            &format!("  Checkpoints: {}_epoch-N.pt", spec.save_path.display()),
        );
        return Ok(());
    }

    let report = train_from_spec(&spec, args.resume.as_deref(), level != LogLevel::Quiet)
        .map_err(|e| format!("Training error: {e}"))?;

    if let Some(path) = &report.last_checkpoint {
        log(
            level,
            LogLevel::Verbose,
            &format!("Last checkpoint: {}", path.display()),
        );
    }
    log(level, LogLevel::Normal, "Training complete!");
    Ok(())
}
