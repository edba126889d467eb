use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use flowgrid_core::project::{self, Project, ProjectError, ProjectFormat};
use flowgrid_core::History;
use flowgrid_types::Timestamp;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: {source}", .path.display())]
    Project {
        path: PathBuf,
        #[source]
        source: ProjectError,
    },
    #[error("{}: expected an action project (.{})", .0.display(), project::ACTION_EXTENSION)]
    NotActionProject(PathBuf),
    #[error("index {index} past the last snapshot ({last})")]
    IndexOutOfRange { index: usize, last: usize },
    #[error(transparent)]
    Output(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Rebuild an action project and print (or write) the state at an index.
    Replay {
        input: PathBuf,
        index: Option<usize>,
        output: Option<PathBuf>,
    },
    /// List the gestures of a project.
    Inspect { input: PathBuf },
    /// Re-encode a project in the format its output extension names.
    Convert { input: PathBuf, output: PathBuf },
}

pub const USAGE: &str = "\
usage: flowgrid [-v|--verbose] <command>

commands:
  replay <project.fga> [--index N] [out.fgs]
  inspect <project.fga|project.fgs>
  convert <in.fga|in.fgs> <out.fga|out.fgs>";

/// Parse arguments after the program name, flags excluded.
pub fn parse(args: &[String]) -> Result<Command, CliError> {
    let mut index = None;
    let mut positional = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-v" | "--verbose" => {}
            "--index" => {
                let value = iter
                    .next()
                    .ok_or_else(|| CliError::Usage("--index needs a value".into()))?;
                let parsed = value
                    .parse::<usize>()
                    .map_err(|_| CliError::Usage(format!("bad --index value {value:?}")))?;
                index = Some(parsed);
            }
            flag if flag.starts_with('-') => {
                return Err(CliError::Usage(format!("unknown flag {flag}")));
            }
            _ => positional.push(arg.as_str()),
        }
    }

    match positional.as_slice() {
        ["replay", input] => Ok(Command::Replay {
            input: input.into(),
            index,
            output: None,
        }),
        ["replay", input, output] => Ok(Command::Replay {
            input: input.into(),
            index,
            output: Some(output.into()),
        }),
        ["inspect", input] if index.is_none() => Ok(Command::Inspect {
            input: input.into(),
        }),
        ["convert", input, output] if index.is_none() => Ok(Command::Convert {
            input: input.into(),
            output: output.into(),
        }),
        _ => Err(CliError::Usage(USAGE.into())),
    }
}

pub fn run(command: &Command, out: &mut impl Write) -> Result<(), CliError> {
    match command {
        Command::Replay {
            input,
            index,
            output,
        } => replay(input, *index, output.as_deref(), out),
        Command::Inspect { input } => inspect(input, out),
        Command::Convert { input, output } => convert(input, output, out),
    }
}

fn load(path: &Path) -> Result<Project, CliError> {
    let with_path = |source| CliError::Project {
        path: path.to_path_buf(),
        source,
    };
    let format = ProjectFormat::from_path(path).map_err(with_path)?;
    let json = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let project = project::decode(&json, format).map_err(with_path)?;
    log::info!("loaded {}", path.display());
    Ok(project)
}

fn save(path: &Path, project: &Project) -> Result<(), CliError> {
    let json = project::encode(project).map_err(|source| CliError::Project {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("wrote {}", path.display());
    Ok(())
}

fn replay(
    input: &Path,
    index: Option<usize>,
    output: Option<&Path>,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let mut history = match load(input)? {
        Project::Actions(history) => history,
        Project::State(_) => return Err(CliError::NotActionProject(input.to_path_buf())),
    };
    if let Some(index) = index {
        let last = history.len() - 1;
        if index > last {
            return Err(CliError::IndexOutOfRange { index, last });
        }
        history.set_index(index);
    }

    let state = Project::State(history.current().clone());
    match output {
        Some(path) => {
            save(path, &state)?;
            writeln!(
                out,
                "snapshot {} of {} ({} entries) -> {}",
                history.index(),
                history.len() - 1,
                history.current().len(),
                path.display()
            )?;
        }
        None => {
            let json = project::encode(&state).map_err(|source| CliError::Project {
                path: input.to_path_buf(),
                source,
            })?;
            writeln!(out, "{json}")?;
        }
    }
    Ok(())
}

fn inspect(input: &Path, out: &mut impl Write) -> Result<(), CliError> {
    match load(input)? {
        Project::State(store) => {
            writeln!(out, "{}: state project, {} entries", input.display(), store.len())?;
            for (path, value) in store.iter() {
                writeln!(out, "  {path} = {}", value.type_name())?;
            }
        }
        Project::Actions(history) => write_history(input, &history, out)?,
    }
    Ok(())
}

fn write_history(input: &Path, history: &History, out: &mut impl Write) -> Result<(), CliError> {
    writeln!(
        out,
        "{}: action project, {} gesture(s), index {}",
        input.display(),
        history.gesture_count(),
        history.index()
    )?;
    let marker = |i: usize| if i == history.index() { '*' } else { ' ' };
    writeln!(out, "{} {:>4}  initial ({} entries)", marker(0), 0, history.initial().len())?;
    for (i, gesture) in history.gestures().enumerate() {
        let kinds: Vec<&str> = gesture.actions.iter().map(|m| m.action.kind()).collect();
        writeln!(
            out,
            "{} {:>4}  t={}  {} action(s): {}",
            marker(i + 1),
            i + 1,
            gesture.commit_time.0,
            gesture.len(),
            kinds.join(", ")
        )?;
    }
    Ok(())
}

fn convert(input: &Path, output: &Path, out: &mut impl Write) -> Result<(), CliError> {
    let target = ProjectFormat::from_path(output).map_err(|source| CliError::Project {
        path: output.to_path_buf(),
        source,
    })?;
    let project = load(input)?;
    let converted = match (project, target) {
        (Project::Actions(history), ProjectFormat::State) => {
            Project::State(history.current().clone())
        }
        (Project::State(store), ProjectFormat::Action) => {
            Project::Actions(project::state_as_history(&store, Timestamp::now()))
        }
        (same, _) => same,
    };
    save(output, &converted)?;
    writeln!(out, "{} -> {}", input.display(), output.display())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgrid_types::{Gesture, Path as StorePath, SavedActionMoment, Store, StoreAction};

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn sample_history() -> History {
        let volume = StorePath::parse("/Volume").unwrap();
        let gestures = (1..=3).map(|v| {
            Gesture::new(
                vec![SavedActionMoment::new(
                    StoreAction::set(volume.clone(), v as f32 / 4.0),
                    Timestamp(v),
                )],
                Timestamp(v + 1),
            )
        });
        History::replay(Store::default(), gestures, 3).unwrap()
    }

    fn write_sample(dir: &Path) -> PathBuf {
        let path = dir.join("take.fga");
        std::fs::write(&path, project::encode_actions(&sample_history()).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse(&args(&["replay", "a.fga", "--index", "2", "b.fgs"])).unwrap(),
            Command::Replay {
                input: "a.fga".into(),
                index: Some(2),
                output: Some("b.fgs".into()),
            }
        );
        assert_eq!(
            parse(&args(&["-v", "inspect", "a.fgs"])).unwrap(),
            Command::Inspect { input: "a.fgs".into() }
        );
        assert!(matches!(parse(&args(&["convert", "a.fga"])), Err(CliError::Usage(_))));
        assert!(matches!(parse(&args(&["replay", "a.fga", "--index", "x"])), Err(CliError::Usage(_))));
        assert!(matches!(parse(&args(&["inspect", "a.fga", "--bogus"])), Err(CliError::Usage(_))));
    }

    #[test]
    fn test_replay_writes_state_at_index() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(dir.path());
        let output = dir.path().join("at1.fgs");
        let mut out = Vec::new();
        run(
            &Command::Replay {
                input,
                index: Some(1),
                output: Some(output.clone()),
            },
            &mut out,
        )
        .unwrap();

        let json = std::fs::read_to_string(&output).unwrap();
        let store = project::decode(&json, ProjectFormat::State).unwrap();
        assert_eq!(
            store.store().get_as::<f32>(&StorePath::parse("/Volume").unwrap()),
            Ok(0.25)
        );
        assert!(String::from_utf8(out).unwrap().starts_with("snapshot 1 of 3"));
    }

    #[test]
    fn test_replay_rejects_bad_index() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(dir.path());
        let result = run(
            &Command::Replay {
                input,
                index: Some(7),
                output: None,
            },
            &mut Vec::new(),
        );
        assert!(matches!(result, Err(CliError::IndexOutOfRange { index: 7, last: 3 })));
    }

    #[test]
    fn test_inspect_marks_current_gesture() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(dir.path());
        let mut out = Vec::new();
        run(&Command::Inspect { input }, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].ends_with("action project, 3 gesture(s), index 3"));
        assert!(lines[1].starts_with("     0  initial"));
        assert!(lines[4].starts_with("*    3  t=4  1 action(s): SetValue"));
    }

    #[test]
    fn test_convert_both_directions() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(dir.path());
        let state = dir.path().join("flat.fgs");
        let back = dir.path().join("again.fga");

        run(&Command::Convert { input, output: state.clone() }, &mut Vec::new()).unwrap();
        run(&Command::Convert { input: state, output: back.clone() }, &mut Vec::new()).unwrap();

        let json = std::fs::read_to_string(&back).unwrap();
        let history = project::decode(&json, ProjectFormat::Action).unwrap().into_history();
        assert_eq!(history.gesture_count(), 1);
        assert_eq!(history.current(), sample_history().current());
    }

    #[test]
    fn test_unknown_extension_is_reported() {
        let result = run(&Command::Inspect { input: "notes.txt".into() }, &mut Vec::new());
        assert!(matches!(
            result,
            Err(CliError::Project { source: ProjectError::UnknownFormat(_), .. })
        ));
    }
}
