//! Operation scripts
//!
//! One operation per line (or per command-line argument):
//!
//! ```text
//! setup 0 mode=0,sck=5,mosi=6,miso=8,cs=7
//! write 0 8 0x9f [1,2,3] "text" hex:0a0b
//! repeatwrite 0 8 0xff 16
//! read 0 16 2
//! readbytes 0 3
//! deinit 0
//! ```
//!
//! `#` starts a comment. Dispatcher failures are reported as
//! `error <code>: <message>` and do not stop the script.

use std::fmt;

use spibridge_core::config::parse_int;
use spibridge_core::{ConfigTable, Error, ReadOutcome, WriteItem};

use crate::backends::Bridge;

/// One parsed operation
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// `setup <id> <k=v,...>`, with no table when no options follow the id
    Setup { id: i64, table: Option<ConfigTable> },
    /// `write <id> <bits> <item>...`
    Write {
        id: i64,
        bits: i64,
        items: Vec<WriteItem>,
    },
    /// `repeatwrite <id> <bits> <value> <count>`
    RepeatWrite {
        id: i64,
        bits: i64,
        value: i64,
        count: usize,
    },
    /// `read <id> <bits> <count>`
    Read { id: i64, bits: i64, count: usize },
    /// `readbytes <id> <count>`
    ReadBytes { id: i64, count: usize },
    /// `deinit <id>`
    Deinit { id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Text(Vec<u8>),
    List(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word(w) => f.write_str(w),
            Self::Text(_) => f.write_str("string"),
            Self::List(l) => write!(f, "[{}]", l),
        }
    }
}

fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => break,
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        None => return Err("Unterminated string".into()),
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('r') => text.push('\r'),
                            Some('t') => text.push('\t'),
                            Some('0') => text.push('\0'),
                            Some(c @ ('\\' | '"')) => text.push(c),
                            Some(c) => return Err(format!("Unknown escape '\\{}'", c)),
                            None => return Err("Unterminated string".into()),
                        },
                        Some(c) => text.push(c),
                    }
                }
                tokens.push(Token::Text(text.into_bytes()));
            }
            '[' => {
                chars.next();
                let mut inner = String::new();
                loop {
                    match chars.next() {
                        None => return Err("Unterminated '['".into()),
                        Some(']') => break,
                        Some(c) => inner.push(c),
                    }
                }
                tokens.push(Token::List(inner));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == '#' {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }

    Ok(tokens)
}

fn int(token: Option<&Token>, what: &str) -> Result<i64, String> {
    match token {
        Some(Token::Word(w)) => parse_int(w).ok_or_else(|| format!("Invalid {}: {}", what, w)),
        Some(other) => Err(format!("Invalid {}: {}", what, other)),
        None => Err(format!("Missing {}", what)),
    }
}

fn count(token: Option<&Token>) -> Result<usize, String> {
    let n = int(token, "count")?;
    usize::try_from(n).map_err(|_| format!("Invalid count: {}", n))
}

fn hex_bytes(s: &str) -> Result<Vec<u8>, String> {
    if s.len() % 2 != 0 {
        return Err(format!("Odd number of hex digits: hex:{}", s));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            s.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("Invalid hex bytes: hex:{}", s))
        })
        .collect()
}

fn write_item(token: &Token) -> Result<WriteItem, String> {
    match token {
        Token::Text(bytes) => Ok(WriteItem::Bytes(bytes.clone())),
        Token::List(inner) => inner
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| parse_int(v).ok_or_else(|| format!("Invalid value in list: {}", v)))
            .collect::<Result<Vec<_>, _>>()
            .map(WriteItem::Words),
        Token::Word(w) => match w.strip_prefix("hex:") {
            Some(hex) => hex_bytes(hex).map(WriteItem::Bytes),
            None => parse_int(w)
                .map(WriteItem::Word)
                .ok_or_else(|| format!("Invalid value: {}", w)),
        },
    }
}

fn expect_end(tokens: &[Token], n: usize, usage: &str) -> Result<(), String> {
    match tokens.get(n) {
        Some(extra) => Err(format!("Unexpected '{}', usage: {}", extra, usage)),
        None => Ok(()),
    }
}

/// Parse one line; blank lines and comments give `None`
pub fn parse_line(line: &str) -> Result<Option<Op>, String> {
    let tokens = tokenize(line)?;
    let Some(first) = tokens.first() else {
        return Ok(None);
    };
    let Token::Word(name) = first else {
        return Err(format!("Expected an operation, found {}", first));
    };
    let arg = |n: usize| tokens.get(n);

    let op = match name.to_ascii_lowercase().as_str() {
        "setup" => {
            let id = int(arg(1), "channel id")?;
            let mut options = Vec::new();
            for token in &tokens[2..] {
                match token {
                    Token::Word(w) => options.push(w.as_str()),
                    other => return Err(format!("Invalid option: {}", other)),
                }
            }
            let table = if options.is_empty() {
                None
            } else {
                Some(ConfigTable::parse(&options.join(","))?)
            };
            Op::Setup { id, table }
        }
        "write" => Op::Write {
            id: int(arg(1), "channel id")?,
            bits: int(arg(2), "bit width")?,
            items: tokens
                .get(3..)
                .unwrap_or_default()
                .iter()
                .map(write_item)
                .collect::<Result<_, _>>()?,
        },
        "repeatwrite" => {
            expect_end(&tokens, 5, "repeatwrite <id> <bits> <value> <count>")?;
            Op::RepeatWrite {
                id: int(arg(1), "channel id")?,
                bits: int(arg(2), "bit width")?,
                value: int(arg(3), "value")?,
                count: count(arg(4))?,
            }
        }
        "read" => {
            expect_end(&tokens, 4, "read <id> <bits> <count>")?;
            Op::Read {
                id: int(arg(1), "channel id")?,
                bits: int(arg(2), "bit width")?,
                count: count(arg(3))?,
            }
        }
        "readbytes" => {
            expect_end(&tokens, 3, "readbytes <id> <count>")?;
            Op::ReadBytes {
                id: int(arg(1), "channel id")?,
                count: count(arg(2))?,
            }
        }
        "deinit" => {
            expect_end(&tokens, 2, "deinit <id>")?;
            Op::Deinit {
                id: int(arg(1), "channel id")?,
            }
        }
        _ => return Err(format!("Unknown operation: {}", name)),
    };

    Ok(Some(op))
}

/// Parse a whole script, reporting the first bad line
pub fn parse_script(source: &str) -> Result<Vec<Op>, String> {
    let mut ops = Vec::new();
    for (n, line) in source.lines().enumerate() {
        if let Some(op) = parse_line(line).map_err(|e| format!("line {}: {}", n + 1, e))? {
            ops.push(op);
        }
    }
    Ok(ops)
}

fn format_bytes(bytes: &[u8]) -> String {
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("hex:{}", hex)
}

/// Run one operation, returning the line to print
pub fn execute(bridge: &mut dyn Bridge, op: &Op) -> Result<String, Error> {
    match op {
        Op::Setup { id, table } => bridge.setup(*id, table.as_ref()).map(|()| "0".to_string()),
        Op::Write { id, bits, items } => bridge
            .write(*id, *bits, items)
            .map(|outcome| outcome.value().to_string()),
        Op::RepeatWrite {
            id,
            bits,
            value,
            count,
        } => bridge
            .repeat_write(*id, *bits, *value, *count)
            .map(|n| n.to_string()),
        Op::Read { id, bits, count } => {
            bridge
                .read(*id, *bits, *count)
                .map(|outcome| match outcome {
                    ReadOutcome::Word(word) => word.to_string(),
                    ReadOutcome::Words(words) => {
                        let words: Vec<String> = words.iter().map(u16::to_string).collect();
                        format!("[{}]", words.join(", "))
                    }
                })
        }
        Op::ReadBytes { id, count } => bridge
            .read_bytes(*id, *count)
            .map(|bytes| format_bytes(&bytes)),
        Op::Deinit { id } => bridge.deinit(*id).map(|()| "0".to_string()),
    }
}

/// Run operations in order, printing each result; returns the number of failures
pub fn run(bridge: &mut dyn Bridge, ops: &[Op]) -> usize {
    let mut failures = 0;
    for op in ops {
        log::debug!("{:?}", op);
        match execute(bridge, op) {
            Ok(line) => println!("{}", line),
            Err(e) => {
                println!("error {}: {}", e.code(), e);
                failures += 1;
            }
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use spibridge_core::Field;

    #[test]
    fn test_parse_operations() {
        assert_eq!(parse_line("   # only a comment").unwrap(), None);
        assert_eq!(parse_line("").unwrap(), None);

        assert_eq!(
            parse_line("setup 0 mode=1 sck=5,mosi=6 cs=7 # soft").unwrap(),
            Some(Op::Setup {
                id: 0,
                table: Some(ConfigTable::parse("mode=1,sck=5,mosi=6,cs=7").unwrap()),
            })
        );
        assert_eq!(
            parse_line("setup 1").unwrap(),
            Some(Op::Setup { id: 1, table: None })
        );
        assert_eq!(
            parse_line("READ 0 16 0x2").unwrap(),
            Some(Op::Read {
                id: 0,
                bits: 16,
                count: 2
            })
        );
        assert_eq!(
            parse_line("repeatwrite 2 8 -1 4").unwrap(),
            Some(Op::RepeatWrite {
                id: 2,
                bits: 8,
                value: -1,
                count: 4
            })
        );
    }

    #[test]
    fn test_parse_write_items() {
        let op = parse_line(r#"write 0 8 0x9f [1, 2,3] "a\"b\n" hex:0A0b []"#).unwrap();
        assert_eq!(
            op,
            Some(Op::Write {
                id: 0,
                bits: 8,
                items: vec![
                    WriteItem::Word(0x9f),
                    WriteItem::Words(vec![1, 2, 3]),
                    WriteItem::Bytes(b"a\"b\n".to_vec()),
                    WriteItem::Bytes(vec![0x0a, 0x0b]),
                    WriteItem::Words(vec![]),
                ],
            })
        );
        assert_eq!(
            parse_line("write 0 8").unwrap(),
            Some(Op::Write {
                id: 0,
                bits: 8,
                items: vec![]
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_line("flash 0").is_err());
        assert!(parse_line("read 0 8").is_err());
        assert!(parse_line("read 0 8 -1").is_err());
        assert!(parse_line("read 0 8 1 2").is_err());
        assert!(parse_line("write 0 8 \"open").is_err());
        assert!(parse_line("write 0 8 [1,2").is_err());
        assert!(parse_line("write 0 8 hex:abc").is_err());
        assert!(parse_line("write 0 8 [1,x]").is_err());
        assert!(parse_line("setup 0 mode").is_err());

        let err = parse_script("deinit 0\n\nbogus\n").unwrap_err();
        assert!(err.starts_with("line 3:"), "{}", err);
    }

    #[cfg(feature = "sim")]
    #[test]
    fn test_script_against_sim() {
        let script = "
            # loopback on the soft channel
            setup 0 mode=3,sck=5,mosi=6,miso=8,cs=7,duplex=1
            write 0 8 0x3c
            write 0 8 256
            repeatwrite 0 8 0x55 3
            readbytes 0 2
            deinit 0
            read 0 8 1
            setup 5 mode=0
            setup 1
            setup 1 name=lcd
        ";
        let ops = parse_script(script).unwrap();
        let mut bus = spibridge_sim::SimConfig::default().wire(6, 8).open();

        let results: Vec<_> = ops.iter().map(|op| execute(&mut bus, op)).collect();
        assert_eq!(
            results,
            vec![
                Ok("0".to_string()),
                Ok("60".to_string()),
                Err(Error::OutOfRangeValue),
                Ok("3".to_string()),
                Ok("hex:0000".to_string()),
                Ok("0".to_string()),
                Err(Error::NotConfigured),
                Err(Error::InvalidChannelId),
                Err(Error::MissingConfiguration),
                Err(Error::MissingField(Field::Mode)),
            ]
        );
        assert_eq!(run(&mut bus, &ops[2..3]), 1);
    }
}
