use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use crate::audio::SampleSource;
use crate::error::Result;
use crate::processing::{MetricsSnapshot, TimegrapherProcessor};

/// Changes requested while a session is running
///
/// Commands are applied between processing cycles, never during one.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    SetPosture(usize),
    SetLiftAngle(f64),
    SetExpectedBph(f64),
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The source ran out of samples
    SourceExhausted,
    Stopped,
}

/// How a session loop paces itself and where it takes commands from
#[derive(Default)]
pub struct SessionOptions<'a> {
    pub commands: Option<&'a Receiver<SessionCommand>>,
    /// Sleep between polls of the source; `None` runs as fast as data allows
    pub cadence: Option<Duration>,
}

/// Drive `processor` from `source` until the source ends or a
/// [`SessionCommand::Stop`] arrives, handing every snapshot to `publish`
///
/// Only a failing source ends the session with an error. Rejected commands
/// are logged and the session carries on.
pub fn run_session<S, F>(
    source: &mut S,
    processor: &mut TimegrapherProcessor,
    options: SessionOptions<'_>,
    mut publish: F,
) -> Result<SessionEnd>
where
    S: SampleSource + ?Sized,
    F: FnMut(&MetricsSnapshot),
{
    loop {
        let cycle_start = Instant::now();

        if let Some(rx) = options.commands {
            for command in rx.try_iter() {
                if !apply_command(processor, command) {
                    return Ok(SessionEnd::Stopped);
                }
            }
        }

        match source.read()? {
            Some(samples) => processor.push_samples(&samples),
            None => {
                drain(processor, &mut publish);
                return Ok(SessionEnd::SourceExhausted);
            }
        }

        drain(processor, &mut publish);

        if let Some(cadence) = options.cadence
            && let Some(remaining) = cadence.checked_sub(cycle_start.elapsed())
        {
            std::thread::sleep(remaining);
        }
    }
}

fn drain<F: FnMut(&MetricsSnapshot)>(processor: &mut TimegrapherProcessor, publish: &mut F) {
    while let Some(snapshot) = processor.process_cycle() {
        publish(&snapshot);
    }
}

/// Returns `false` when the session should stop
fn apply_command(processor: &mut TimegrapherProcessor, command: SessionCommand) -> bool {
    let result = match command {
        SessionCommand::Stop => return false,
        SessionCommand::SetPosture(index) => processor.set_posture(index),
        SessionCommand::SetLiftAngle(degrees) => processor.set_lift_angle(degrees),
        SessionCommand::SetExpectedBph(bph) => processor.set_expected_bph(bph),
    };
    if let Err(e) = result {
        log::warn!("Command rejected: {}", e);
    }
    true
}

impl std::str::FromStr for SessionCommand {
    type Err = String;

    /// Parse an interactive command line: `posture N`, `lift DEG`,
    /// `bph RATE` or `quit`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let verb = parts.next().ok_or("empty command")?.to_lowercase();
        let arg = parts.next();

        let number = |arg: Option<&str>| -> std::result::Result<f64, String> {
            arg.ok_or_else(|| format!("'{}' needs a value", verb))?
                .parse::<f64>()
                .map_err(|e| format!("invalid value for '{}': {}", verb, e))
        };

        match verb.as_str() {
            "posture" | "p" => {
                let index = arg
                    .ok_or("'posture' needs an index")?
                    .parse::<usize>()
                    .map_err(|e| format!("invalid posture index: {}", e))?;
                Ok(SessionCommand::SetPosture(index))
            }
            "lift" | "l" => Ok(SessionCommand::SetLiftAngle(number(arg)?)),
            "bph" | "b" => {
                let rate: crate::config::BeatRate = arg.ok_or("'bph' needs a value")?.parse()?;
                Ok(SessionCommand::SetExpectedBph(rate.as_bph()))
            }
            "quit" | "q" | "stop" => Ok(SessionCommand::Stop),
            other => Err(format!("unknown command '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::WavFileSource;
    use crate::config::TimegrapherConfig;

    #[test]
    fn test_parse_commands() {
        assert_eq!("posture 2".parse::<SessionCommand>(), Ok(SessionCommand::SetPosture(2)));
        assert_eq!("lift 52".parse::<SessionCommand>(), Ok(SessionCommand::SetLiftAngle(52.0)));
        assert_eq!("bph 4hz".parse::<SessionCommand>(), Ok(SessionCommand::SetExpectedBph(28800.0)));
        assert_eq!("q".parse::<SessionCommand>(), Ok(SessionCommand::Stop));
        assert!("posture".parse::<SessionCommand>().is_err());
        assert!("jump 3".parse::<SessionCommand>().is_err());
    }

    #[test]
    fn test_session_runs_until_source_ends() {
        let config = TimegrapherConfig::default();
        let mut processor = TimegrapherProcessor::new(&config).unwrap();
        let mut source = WavFileSource::from_samples(vec![0.0; 48000], 48000, 2400);

        let mut published = 0;
        let end = run_session(
            &mut source,
            &mut processor,
            SessionOptions::default(),
            |_| published += 1,
        )
        .unwrap();

        assert_eq!(end, SessionEnd::SourceExhausted);
        assert_eq!(published, 20);
    }

    #[test]
    fn test_commands_applied_between_cycles() {
        let config = TimegrapherConfig::default();
        let mut processor = TimegrapherProcessor::new(&config).unwrap();
        let mut source = WavFileSource::from_samples(vec![0.0; 48000], 48000, 4800);

        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(SessionCommand::SetPosture(3)).unwrap();
        tx.send(SessionCommand::SetPosture(42)).unwrap();
        tx.send(SessionCommand::Stop).unwrap();

        let end = run_session(
            &mut source,
            &mut processor,
            SessionOptions {
                commands: Some(&rx),
                cadence: None,
            },
            |_| {},
        )
        .unwrap();

        assert_eq!(end, SessionEnd::Stopped);
        assert_eq!(processor.posture().current(), 3);
    }
}
