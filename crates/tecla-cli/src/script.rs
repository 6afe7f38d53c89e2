//! Key-event scripts: a minimal text format standing in for the button
//! scanner when running on a host.
//!
//! One event per line: `<time_ms> down|up <key>`. Blank lines and `#`
//! comments are skipped. Events are sorted by time on parse.

use anyhow::{Context, bail};

/// One scripted key transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScriptEvent {
    /// Milliseconds from the start of the run.
    pub at_ms: u64,
    /// Key index.
    pub key: usize,
    /// True for press, false for release.
    pub down: bool,
}

/// Parse a script file's contents.
pub fn parse(text: &str) -> anyhow::Result<Vec<ScriptEvent>> {
    let mut events = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(at), Some(action), Some(key)) = (parts.next(), parts.next(), parts.next())
        else {
            bail!("line {}: expected '<ms> down|up <key>'", number + 1);
        };
        let at_ms: u64 = at
            .parse()
            .with_context(|| format!("line {}: bad time '{at}'", number + 1))?;
        let key: usize = key
            .parse()
            .with_context(|| format!("line {}: bad key '{key}'", number + 1))?;
        let down = match action {
            "down" => true,
            "up" => false,
            other => bail!("line {}: expected down|up, got '{other}'", number + 1),
        };
        events.push(ScriptEvent { at_ms, key, down });
    }
    events.sort_by_key(|e| e.at_ms);
    Ok(events)
}

/// The built-in demo: a held C major chord with a short melody on top.
pub fn demo() -> Vec<ScriptEvent> {
    let mut events = Vec::new();
    let mut press = |at_ms: u64, key: usize, for_ms: u64| {
        events.push(ScriptEvent {
            at_ms,
            key,
            down: true,
        });
        events.push(ScriptEvent {
            at_ms: at_ms + for_ms,
            key,
            down: false,
        });
    };

    // With the CLI layout (first key two octaves below middle C), key 12 is
    // C3. Chord: C3-E3-G3 under the melody.
    press(0, 12, 2900);
    press(0, 16, 2900);
    press(0, 19, 2900);
    // Melody: C5 E5 G5 E5 C5.
    press(200, 36, 350);
    press(600, 40, 350);
    press(1000, 43, 350);
    press(1400, 40, 350);
    press(1800, 36, 1000);

    events.sort_by_key(|e| e.at_ms);
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_sorts() {
        let events = parse("100 up 3\n0 down 3\n# comment\n\n50 down 7 # trailing\n").unwrap();
        assert_eq!(
            events,
            vec![
                ScriptEvent {
                    at_ms: 0,
                    key: 3,
                    down: true
                },
                ScriptEvent {
                    at_ms: 50,
                    key: 7,
                    down: true
                },
                ScriptEvent {
                    at_ms: 100,
                    key: 3,
                    down: false
                },
            ]
        );
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse("abc down 1").is_err());
        assert!(parse("100 sideways 1").is_err());
        assert!(parse("100 down").is_err());
    }

    #[test]
    fn demo_is_balanced() {
        let events = demo();
        let downs = events.iter().filter(|e| e.down).count();
        let ups = events.iter().filter(|e| !e.down).count();
        assert_eq!(downs, ups);
    }
}
