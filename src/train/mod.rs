//! Driving the Ultralytics `yolo` CLI for training and prediction.
//!
//! Training itself is out of scope: a [`TrainPlan`] only describes which
//! `yolo detect train` runs to make, in which order, and with what settings.
//! Each phase after the first starts from the previous phase's best weights
//! unless it names its own model.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::error::YoloprepError;

/// Default executable name of the Ultralytics CLI.
pub const DEFAULT_YOLO_BIN: &str = "yolo";

fn default_model() -> String {
    "yolov8n.pt".to_string()
}

fn default_imgsz() -> u32 {
    640
}

fn default_batch() -> u32 {
    16
}

fn default_project() -> PathBuf {
    PathBuf::from("runs")
}

fn default_true() -> bool {
    true
}

/// A sequence of training runs sharing one dataset and base settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainPlan {
    /// Dataset manifest (`data.yaml`).
    pub data: PathBuf,
    /// Starting weights of the first phase.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_imgsz")]
    pub imgsz: u32,
    #[serde(default = "default_batch")]
    pub batch: u32,
    #[serde(default)]
    pub workers: Option<u32>,
    /// e.g. `mps`, `cpu`, `0`.
    #[serde(default)]
    pub device: Option<String>,
    /// Directory that receives one run directory per phase.
    #[serde(default = "default_project")]
    pub project: PathBuf,
    #[serde(default = "default_true")]
    pub val: bool,
    pub phases: Vec<TrainPhase>,
}

/// One `yolo detect train` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainPhase {
    /// Run name; weights land in `<project>/<name>/weights/`.
    pub name: String,
    pub epochs: u32,
    /// Number of leading layers to freeze (e.g. 10 for the backbone).
    #[serde(default)]
    pub freeze: Option<u32>,
    /// Starting weights; defaults to the previous phase's `best.pt`.
    #[serde(default)]
    pub model: Option<String>,
}

impl TrainPlan {
    pub fn from_yaml(path: &Path) -> Result<Self, YoloprepError> {
        let content = std::fs::read_to_string(path).map_err(|e| YoloprepError::io_at(path, e))?;
        let plan: TrainPlan =
            serde_yaml::from_str(&content).map_err(|source| YoloprepError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> Result<(), YoloprepError> {
        let invalid = |message: String| YoloprepError::InvalidArguments { message };

        if self.phases.is_empty() {
            return Err(invalid("training plan has no phases".to_string()));
        }
        for (idx, phase) in self.phases.iter().enumerate() {
            if phase.name.trim().is_empty() {
                return Err(invalid(format!("phase {} has an empty name", idx + 1)));
            }
            if phase.epochs == 0 {
                return Err(invalid(format!("phase '{}' has zero epochs", phase.name)));
            }
            if self.phases[..idx].iter().any(|p| p.name == phase.name) {
                return Err(invalid(format!(
                    "phase name '{}' is used more than once",
                    phase.name
                )));
            }
        }
        Ok(())
    }

    /// Best weights written by a phase.
    pub fn best_weights(&self, phase: &TrainPhase) -> PathBuf {
        self.project
            .join(&phase.name)
            .join("weights")
            .join("best.pt")
    }

    /// One invocation per phase, in order.
    pub fn invocations(&self) -> Vec<YoloInvocation> {
        let mut previous: Option<&TrainPhase> = None;
        let mut invocations = Vec::with_capacity(self.phases.len());

        for phase in &self.phases {
            let model = match (&phase.model, previous) {
                (Some(model), _) => model.clone(),
                (None, Some(prev)) => self.best_weights(prev).to_string_lossy().into_owned(),
                (None, None) => self.model.clone(),
            };

            let mut args = vec!["detect".to_string(), "train".to_string()];
            push_arg(&mut args, "model", &model);
            push_arg(&mut args, "data", &self.data.to_string_lossy());
            push_arg(&mut args, "imgsz", &self.imgsz.to_string());
            push_arg(&mut args, "epochs", &phase.epochs.to_string());
            push_arg(&mut args, "batch", &self.batch.to_string());
            if let Some(workers) = self.workers {
                push_arg(&mut args, "workers", &workers.to_string());
            }
            if let Some(device) = &self.device {
                push_arg(&mut args, "device", device);
            }
            push_arg(&mut args, "project", &self.project.to_string_lossy());
            push_arg(&mut args, "name", &phase.name);
            if let Some(freeze) = phase.freeze {
                push_arg(&mut args, "freeze", &freeze.to_string());
            }
            push_arg(&mut args, "val", python_bool(self.val));

            invocations.push(YoloInvocation {
                step: format!("train:{}", phase.name),
                args,
            });
            previous = Some(phase);
        }

        invocations
    }
}

/// Settings for one `yolo detect predict` run.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictOptions {
    pub model: String,
    pub source: PathBuf,
    pub conf: Option<f32>,
    pub device: Option<String>,
    /// Write YOLO label files for each prediction.
    pub save_txt: bool,
    /// Include confidences in saved label files.
    pub save_conf: bool,
    pub project: Option<PathBuf>,
    pub name: Option<String>,
}

impl PredictOptions {
    pub fn invocation(&self) -> YoloInvocation {
        let mut args = vec!["detect".to_string(), "predict".to_string()];
        push_arg(&mut args, "model", &self.model);
        push_arg(&mut args, "source", &self.source.to_string_lossy());
        push_arg(&mut args, "save", python_bool(true));
        if self.save_txt {
            push_arg(&mut args, "save_txt", python_bool(true));
        }
        if self.save_conf {
            push_arg(&mut args, "save_conf", python_bool(true));
        }
        if let Some(conf) = self.conf {
            push_arg(&mut args, "conf", &conf.to_string());
        }
        if let Some(device) = &self.device {
            push_arg(&mut args, "device", device);
        }
        if let Some(project) = &self.project {
            push_arg(&mut args, "project", &project.to_string_lossy());
        }
        if let Some(name) = &self.name {
            push_arg(&mut args, "name", name);
        }
        YoloInvocation {
            step: "predict".to_string(),
            args,
        }
    }
}

/// Arguments for one run of the `yolo` executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YoloInvocation {
    /// Short label for logs and errors.
    pub step: String,
    pub args: Vec<String>,
}

impl YoloInvocation {
    /// Shell-style rendering, for display only.
    pub fn command_line(&self, program: &str) -> String {
        std::iter::once(program)
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for YoloInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command_line(DEFAULT_YOLO_BIN))
    }
}

/// Runs invocations of an external program.
pub trait CommandRunner {
    fn run(&mut self, program: &str, invocation: &YoloInvocation) -> Result<(), YoloprepError>;
}

/// Spawns the program as a blocking child process with inherited stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, program: &str, invocation: &YoloInvocation) -> Result<(), YoloprepError> {
        tracing::info!(step = %invocation.step, command = %invocation.command_line(program), "launching");
        let status = Command::new(program)
            .args(&invocation.args)
            .status()
            .map_err(|source| YoloprepError::TrainerLaunch {
                program: program.to_string(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(YoloprepError::TrainerFailed {
                step: invocation.step.clone(),
                status: status.to_string(),
            })
        }
    }
}

/// Run invocations in order, stopping at the first failure.
pub fn run_all<R: CommandRunner + ?Sized>(
    runner: &mut R,
    program: &str,
    invocations: &[YoloInvocation],
) -> Result<(), YoloprepError> {
    for invocation in invocations {
        runner.run(program, invocation)?;
    }
    Ok(())
}

fn push_arg(args: &mut Vec<String>, key: &str, value: &str) {
    args.push(format!("{key}={value}"));
}

fn python_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}
