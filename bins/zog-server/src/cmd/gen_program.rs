use std::path::Path;

use crate::config::GenProgramArgs;
use crate::error::ServerError;

use super::write_output;

pub fn run(args: GenProgramArgs) -> Result<(), ServerError> {
    let cwd = std::env::current_dir()?;
    let text = render(&args, &cwd)?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| cwd.join(format!("{}.conf", args.name)));
    write_output(Some(&output), &text)
}

/// `[program:<name>]` section running `zog start` with the given receiver
/// flags. The flags are validated the same way `start` would.
pub fn render(args: &GenProgramArgs, cwd: &Path) -> Result<String, ServerError> {
    if args.name.is_empty() || args.name.contains(|c: char| c.is_whitespace() || c == ']') {
        return Err(ServerError::Usage(format!("invalid program name '{}'", args.name)));
    }
    if args.receiver.kind.is_none() || args.receiver.addr.is_none() {
        return Err(ServerError::Usage("gen-program needs -t and -a".into()));
    }
    args.receiver.resolve(None)?;

    let logpath = args.logpath.clone().unwrap_or_else(|| cwd.join("logs"));
    let mut command = vec![args.exe.clone(), "start".to_string()];
    command.extend(args.receiver.to_flags());
    command.push(logpath.display().to_string());

    let mut lines = vec![
        format!("[program:{}]", args.name),
        format!("command={}", command.join(" ")),
        format!("directory={}", cwd.display()),
    ];
    if let Some(user) = &args.user {
        lines.push(format!("user={user}"));
    }
    lines.extend([
        "autostart=true".to_string(),
        "autorestart=true".to_string(),
        "startsecs=3".to_string(),
        "stopsignal=INT".to_string(),
        "redirect_stderr=true".to_string(),
        format!("stdout_logfile={}", cwd.join(format!("{}.out.log", args.name)).display()),
    ]);

    let mut text = lines.join("\n");
    text.push('\n');
    Ok(text)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::config::{Cli, Commands};

    fn program_args(argv: &[&str]) -> GenProgramArgs {
        let cli = Cli::try_parse_from(["zog", "gen-program"].into_iter().chain(argv.iter().copied())).unwrap();
        match cli.command {
            Commands::GenProgram(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn section_runs_zog_start_with_the_flags() {
        let args = program_args(&[
            "-n", "zog-app", "-t", "bus", "-a", "127.0.0.1:6379/0", "-c", "app.*", "-c", "req.*", "-u", "app",
            "--exe", "/usr/local/bin/zog",
        ]);
        let text = render(&args, Path::new("/srv/zog")).unwrap();

        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("[program:zog-app]"));
        assert_eq!(
            lines.next(),
            Some("command=/usr/local/bin/zog start -t bus -a 127.0.0.1:6379/0 -c app.* -c req.* /srv/zog/logs")
        );
        assert!(text.contains("\ndirectory=/srv/zog\n"));
        assert!(text.contains("\nuser=app\n"));
        assert!(text.contains("\nstdout_logfile=/srv/zog/zog-app.out.log\n"));
        assert!(text.contains("\nstopsignal=INT\n"));
    }

    #[test]
    fn explicit_logpath_and_no_user() {
        let args = program_args(&["-n", "ingest", "-t", "direct", "-a", "tcp://*:5011", "-p", "/var/log/zog"]);
        let text = render(&args, Path::new("/srv/zog")).unwrap();

        assert!(text.contains("command=zog start -t direct -a tcp://*:5011 /var/log/zog\n"));
        assert!(!text.contains("user="));
    }

    #[test]
    fn invalid_receiver_is_rejected() {
        let args = program_args(&["-n", "bad", "-t", "bus", "-a", "127.0.0.1:6379"]);
        assert!(render(&args, Path::new("/srv/zog")).is_err());

        let args = program_args(&["-n", "bad", "-t", "direct", "-a", "127.0.0.1:5011"]);
        assert!(matches!(render(&args, Path::new("/srv/zog")), Err(ServerError::Usage(_))));

        let args = program_args(&["-n", "bad", "-t", "direct"]);
        assert!(matches!(render(&args, Path::new("/srv/zog")), Err(ServerError::Usage(_))));
    }
}
