//! Turns a trial assignment into the workload's command line.

use gs_types::{ExperimentConfig, ParameterValue, TrialConfig};
use std::borrow::Cow;

/// Fully-resolved workload invocation for one trial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadInvocation {
    program: String,
    args: Vec<String>,
}

impl WorkloadInvocation {
    /// Shared experiment settings come first, then one flag per axis in
    /// declaration order. Axis `batch_size` becomes `--batch-size`; boolean
    /// axes are bare switches, present only when `true`.
    pub fn build(trial: &TrialConfig, experiment: &ExperimentConfig) -> Self {
        let program = match experiment.venv() {
            Some(venv) => venv.join("bin").join("python").display().to_string(),
            None => "python3".to_string(),
        };

        let mut args = vec![
            experiment.workload().display().to_string(),
            "--arch".to_string(),
            experiment.architecture().as_str().to_string(),
            "--parallelism".to_string(),
            experiment.parallelism().as_str().to_string(),
            "--epochs".to_string(),
            experiment.epochs().to_string(),
        ];
        if let Some(dataset) = experiment.dataset() {
            args.push("--data".to_string());
            args.push(dataset.display().to_string());
        }

        for (name, value) in trial.iter() {
            let flag = format!("--{}", name.replace('_', "-"));
            match value {
                ParameterValue::Bool(true) => args.push(flag),
                ParameterValue::Bool(false) => {}
                other => {
                    args.push(flag);
                    args.push(other.to_string());
                }
            }
        }

        Self { program, args }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Shell command line for the remote side, stderr folded into stdout.
    pub fn to_command_line(&self) -> String {
        let mut line = shell_quote(&self.program).into_owned();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&shell_quote(arg));
        }
        line.push_str(" 2>&1");
        line
    }
}

/// Quote `s` for a POSIX shell. Plain words pass through untouched.
pub fn shell_quote(s: &str) -> Cow<'_, str> {
    let plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(format!("'{}'", s.replace('\'', r"'\''")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_types::{Architecture, Credentials, Parallelism};

    fn experiment() -> ExperimentConfig {
        ExperimentConfig::builder("/opt/models/ImageNet/train.py", "accuracy")
            .with_venv("/u4/trainer/venv")
            .with_dataset("/data/ILSVRC/Data/CLS-LOC")
            .with_architecture(Architecture::ResNet)
            .with_parallelism(Parallelism::Pipeline)
            .with_epochs(3)
            .with_machines(["gpu1"])
            .with_credentials(Credentials::new("trainer", None))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builds_flags_from_experiment_and_trial() {
        let trial = TrialConfig::from_pairs([
            ("lr", ParameterValue::Float(0.01)),
            ("batch_size", ParameterValue::Int(64)),
            ("dry_run", ParameterValue::Bool(true)),
            ("save_model", ParameterValue::Bool(false)),
        ]);
        let invocation = WorkloadInvocation::build(&trial, &experiment());

        assert_eq!(invocation.program(), "/u4/trainer/venv/bin/python");
        assert_eq!(
            invocation.args(),
            [
                "/opt/models/ImageNet/train.py",
                "--arch",
                "resnet",
                "--parallelism",
                "gpipe",
                "--epochs",
                "3",
                "--data",
                "/data/ILSVRC/Data/CLS-LOC",
                "--lr",
                "0.01",
                "--batch-size",
                "64",
                "--dry-run",
            ]
        );
        assert!(invocation.to_command_line().ends_with("--dry-run 2>&1"));
    }

    #[test]
    fn test_defaults_without_venv_or_dataset() {
        let experiment = ExperimentConfig::builder("train.py", "accuracy")
            .with_machines(["gpu1"])
            .with_credentials(Credentials::new("trainer", None))
            .build()
            .unwrap();
        let invocation = WorkloadInvocation::build(&TrialConfig::default(), &experiment);

        assert_eq!(invocation.program(), "python3");
        assert!(!invocation.args().iter().any(|a| a == "--data"));
        assert_eq!(
            invocation.to_command_line(),
            "python3 train.py --arch resnet --parallelism dp --epochs 1 2>&1"
        );
    }

    #[test]
    fn test_string_values_are_quoted() {
        let trial = TrialConfig::from_pairs([("run_name", ParameterValue::from("it's a test"))]);
        let line = WorkloadInvocation::build(&trial, &experiment()).to_command_line();
        assert!(line.contains(r"--run-name 'it'\''s a test'"));
    }

    #[test]
    fn test_shell_quote_cases() {
        assert_eq!(shell_quote("0.001"), "0.001");
        assert_eq!(shell_quote("/a/b-c_d.py"), "/a/b-c_d.py");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("$(rm -rf /)"), "'$(rm -rf /)'");
    }
}
