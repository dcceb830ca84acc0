//! Validate command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::{load_spec, RunSpec, SchedulerSpec, ValidateArgs};

/// Format training configuration as a string
pub fn format_training_info(spec: &RunSpec) -> String {
    let t = &spec.training;
    [
        format!("  Epochs: {}..={}", t.start_epoch, t.num_epoch),
        format!("  Device: {} {:?}", t.device, t.device_ids),
        format!("  Warm-up epochs: {} (num_layer {})", t.warm_up, t.num_layer),
        format!("  TTA passes: {}", t.tta_time),
        format!(
            "  Augmentation: {:?} (special_augment_prob {}, snapmix_alpha {})",
            t.augment_selection, t.special_augment_prob, t.snapmix_alpha
        ),
        format!("  Precision: {}", t.precision),
        format!("  Seed: {}", t.seed),
    ]
    .join("\n")
}

/// Format model configuration as a string
pub fn format_model_info(spec: &RunSpec) -> String {
    let ema = match spec.model.ema_decay {
        Some(decay) => format!("decay {decay}"),
        None => "disabled".to_string(),
    };
    format!("  Classes: {}\n  EMA: {ema}", spec.model.num_classes)
}

/// Format optimizer and schedule as a string
pub fn format_optimizer_info(spec: &RunSpec) -> String {
    let o = &spec.optimizer;
    let schedule = match &spec.scheduler {
        SchedulerSpec::CosineAnnealing { t_max, lr_min } => format!(
            "cosine annealing (t_max {}, lr_min {lr_min})",
            t_max.unwrap_or(spec.training.num_epoch)
        ),
        SchedulerSpec::StepDecay { step_size, gamma } => {
            format!("step decay (step_size {step_size}, gamma {gamma})")
        }
    };
    [
        format!(
            "  Optimizer: SAM(rho {}, adaptive {}) over {}",
            o.rho, o.adaptive, o.name
        ),
        format!(
            "  Learning rate: {} (momentum {}, weight decay {})",
            o.lr, o.momentum, o.weight_decay
        ),
        format!("  Schedule: {schedule}"),
    ]
    .join("\n")
}

/// Format loss configuration as a string
pub fn format_loss_info(spec: &RunSpec) -> String {
    let l = &spec.loss;
    format!(
        "  Bi-tempered loss: t1 {} t2 {} (label smoothing {}, {} iterations)",
        l.t1, l.t2, l.label_smoothing, l.num_iters
    )
}

/// Print detailed configuration summary
pub fn print_detailed_summary(spec: &RunSpec) {
    println!();
    println!("Configuration Summary:");
    println!("{}", format_training_info(spec));
    println!("{}", format_model_info(spec));
    println!("{}", format_optimizer_info(spec));
    println!("{}", format_loss_info(spec));
    println!("  Checkpoints: {}_epoch-N.pt", spec.save_path.display());
}

pub fn run_validate(args: ValidateArgs, level: LogLevel) -> Result<(), String> {
    log(
        level,
        LogLevel::Normal,
        &format!("Validating config: {}", args.config.display()),
    );

    let spec = load_spec(&args.config).map_err(|e| format!("Config error: {e}"))?;

    log(level, LogLevel::Normal, "✓ Configuration is valid");
    if args.detailed && level != LogLevel::Quiet {
        print_detailed_summary(&spec);
    }
    Ok(())
}
