//! Binary wire formats crossing the process boundary: the `YGRD` grid-cell
//! buffer produced by external grid producers, and the OSC 666666 control
//! sequence a multiplexer uses to create/update a card.

use base64::Engine;

use crate::error::{Error, Result};

pub const GRID_MAGIC: u32 = 0x5947_5244; // "YGRD"
pub const FLAG_FULL: u16 = 0x0001;

const GRID_CELL_LEN: usize = 12;
const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    pub codepoint: u32,
    pub fg: [u8; 4],
    pub bg: [u8; 3],
    pub style: u8,
}

impl GridCell {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.codepoint.to_le_bytes());
        out.extend_from_slice(&self.fg);
        out.extend_from_slice(&self.bg);
        out.push(self.style);
    }

    fn decode(bytes: &[u8]) -> Self {
        let codepoint = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let fg = [bytes[4], bytes[5], bytes[6], bytes[7]];
        let bg = [bytes[8], bytes[9], bytes[10]];
        let style = bytes[11];
        Self { codepoint, fg, bg, style }
    }
}

/// Bit layout of [`GridCell::style`]: bit 0 bold, bit 1 italic, bits 2-3
/// underline kind (0-3), bit 4 strikethrough, bits 5-7 font-family selector.
pub mod style_bits {
    pub const BOLD: u8 = 1 << 0;
    pub const ITALIC: u8 = 1 << 1;
    pub const STRIKETHROUGH: u8 = 1 << 4;

    pub fn underline_kind(style: u8) -> u8 {
        (style >> 2) & 0b11
    }

    pub fn font_family(style: u8) -> u8 {
        (style >> 5) & 0b111
    }
}

/// A grid buffer: either a full row-major `cols*rows` cell array, or a sparse
/// set of `(row, col, cell)` updates.
#[derive(Debug, Clone, PartialEq)]
pub enum GridPayload {
    Full { cols: u8, rows: u8, cells: Vec<GridCell> },
    Partial { cols: u8, rows: u8, updates: Vec<(u8, u8, GridCell)> },
}

impl GridPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            GridPayload::Full { cols, rows, cells } => {
                out.extend_from_slice(&GRID_MAGIC.to_le_bytes());
                out.extend_from_slice(&FLAG_FULL.to_le_bytes());
                out.push(*cols);
                out.push(*rows);
                for cell in cells {
                    cell.encode(&mut out);
                }
            }
            GridPayload::Partial { cols, rows, updates } => {
                out.extend_from_slice(&GRID_MAGIC.to_le_bytes());
                out.extend_from_slice(&0u16.to_le_bytes());
                out.push(*cols);
                out.push(*rows);
                out.extend_from_slice(&(updates.len() as u32).to_le_bytes());
                for (row, col, cell) in updates {
                    out.push(*row);
                    out.push(*col);
                    cell.encode(&mut out);
                }
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::invalid_argument("grid payload shorter than 8-byte header"));
        }
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if magic != GRID_MAGIC {
            return Err(Error::invalid_argument(format!("grid payload magic mismatch: got {magic:#010x}")));
        }
        let flags = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        let cols = bytes[6];
        let rows = bytes[7];
        let body = &bytes[HEADER_LEN..];

        if flags & FLAG_FULL != 0 {
            let expected = cols as usize * rows as usize;
            if body.len() < expected * GRID_CELL_LEN {
                return Err(Error::invalid_argument("full grid payload body shorter than cols*rows cells"));
            }
            let cells = body[..expected * GRID_CELL_LEN].chunks_exact(GRID_CELL_LEN).map(GridCell::decode).collect();
            Ok(GridPayload::Full { cols, rows, cells })
        } else {
            if body.len() < 4 {
                return Err(Error::invalid_argument("partial grid payload missing count field"));
            }
            let count = u32::from_le_bytes(body[0..4].try_into().unwrap()) as usize;
            let rest = &body[4..];
            let entry_len = 2 + GRID_CELL_LEN;
            if rest.len() < count * entry_len {
                return Err(Error::invalid_argument("partial grid payload shorter than declared update count"));
            }
            let updates = rest[..count * entry_len]
                .chunks_exact(entry_len)
                .map(|chunk| (chunk[0], chunk[1], GridCell::decode(&chunk[2..])))
                .collect();
            Ok(GridPayload::Partial { cols, rows, updates })
        }
    }
}

/// A parsed `run` or `update` OSC 666666 control command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run { card: String, x: i32, y: i32, w: u32, h: u32, replace: bool },
    Update { card: String },
}

/// Parses the portion of an OSC 666666 sequence between `ESC ] 666666 ;` and
/// the terminating `ESC \`: `<command> [options…] ;; <base64-payload>`.
/// Returns the parsed command and the decoded payload bytes.
pub fn parse_osc(body: &str) -> Result<(Command, Vec<u8>)> {
    let (command_part, payload_part) =
        body.split_once(";;").ok_or_else(|| Error::invalid_argument("OSC 666666 body missing `;;` payload separator"))?;

    let tokens: Vec<&str> = command_part.split_whitespace().collect();
    let Some((&verb, args)) = tokens.split_first() else {
        return Err(Error::invalid_argument("OSC 666666 body missing command verb"));
    };

    let command = match verb {
        "run" => parse_run(args)?,
        "update" => parse_update(args)?,
        other => return Err(Error::invalid_argument(format!("unknown OSC 666666 command: {other}"))),
    };

    let payload = base64::engine::general_purpose::STANDARD
        .decode(payload_part.trim())
        .map_err(|e| Error::invalid_argument(format!("OSC 666666 payload is not valid base64: {e}")))?;

    Ok((command, payload))
}

fn parse_run(args: &[&str]) -> Result<Command> {
    let mut card = None;
    let mut x = None;
    let mut y = None;
    let mut w = None;
    let mut h = None;
    let mut replace = false;

    let mut it = args.iter();
    while let Some(&arg) = it.next() {
        match arg {
            "-c" => {
                let kind = it.next().ok_or_else(|| Error::invalid_argument("run: -c missing value"))?;
                if *kind != "ygrid" {
                    return Err(Error::invalid_argument(format!("run: unsupported card kind {kind}")));
                }
            }
            "-x" => x = Some(parse_int_arg(&mut it, "-x")?),
            "-y" => y = Some(parse_int_arg(&mut it, "-y")?),
            "-w" => w = Some(parse_uint_arg(&mut it, "-w")?),
            "-h" => h = Some(parse_uint_arg(&mut it, "-h")?),
            "-r" => replace = true,
            "--name" => card = Some((*it.next().ok_or_else(|| Error::invalid_argument("run: --name missing value"))?).to_string()),
            other => return Err(Error::invalid_argument(format!("run: unrecognized option {other}"))),
        }
    }

    Ok(Command::Run {
        card: card.ok_or_else(|| Error::invalid_argument("run: missing --name"))?,
        x: x.ok_or_else(|| Error::invalid_argument("run: missing -x"))?,
        y: y.ok_or_else(|| Error::invalid_argument("run: missing -y"))?,
        w: w.ok_or_else(|| Error::invalid_argument("run: missing -w"))?,
        h: h.ok_or_else(|| Error::invalid_argument("run: missing -h"))?,
        replace,
    })
}

fn parse_update(args: &[&str]) -> Result<Command> {
    let mut it = args.iter();
    while let Some(&arg) = it.next() {
        if arg == "--name" {
            let card = (*it.next().ok_or_else(|| Error::invalid_argument("update: --name missing value"))?).to_string();
            return Ok(Command::Update { card });
        }
        return Err(Error::invalid_argument(format!("update: unrecognized option {arg}")));
    }
    Err(Error::invalid_argument("update: missing --name"))
}

fn parse_int_arg<'a>(it: &mut std::slice::Iter<'a, &'a str>, flag: &str) -> Result<i32> {
    it.next()
        .ok_or_else(|| Error::invalid_argument(format!("{flag} missing value")))?
        .parse()
        .map_err(|_| Error::invalid_argument(format!("{flag} value is not an integer")))
}

fn parse_uint_arg<'a>(it: &mut std::slice::Iter<'a, &'a str>, flag: &str) -> Result<u32> {
    it.next()
        .ok_or_else(|| Error::invalid_argument(format!("{flag} missing value")))?
        .parse()
        .map_err(|_| Error::invalid_argument(format!("{flag} value is not an unsigned integer")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_4_grid_cell_wire_roundtrip() {
        let cell = GridCell { codepoint: 0x41, fg: [255, 255, 255, 255], bg: [0, 0, 0], style: 0x01 };
        let payload = GridPayload::Full { cols: 2, rows: 3, cells: vec![cell; 6] };
        let encoded = payload.encode();
        assert_eq!(encoded.len(), 8 + 6 * 12);
        assert_eq!(u32::from_le_bytes(encoded[0..4].try_into().unwrap()), GRID_MAGIC);
        let flags = u16::from_le_bytes(encoded[4..6].try_into().unwrap());
        assert_ne!(flags & FLAG_FULL, 0);

        let decoded = GridPayload::decode(&encoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn partial_grid_roundtrip() {
        let cell = GridCell { codepoint: 0x42, fg: [1, 2, 3, 4], bg: [5, 6, 7], style: 0 };
        let payload = GridPayload::Partial { cols: 10, rows: 10, updates: vec![(1, 2, cell), (3, 4, cell)] };
        let encoded = payload.encode();
        let decoded = GridPayload::decode(&encoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let bytes = [0u8; 8];
        assert!(GridPayload::decode(&bytes).is_err());
    }

    #[test]
    fn truncated_full_payload_is_rejected() {
        let mut encoded = GRID_MAGIC.to_le_bytes().to_vec();
        encoded.extend_from_slice(&FLAG_FULL.to_le_bytes());
        encoded.push(2);
        encoded.push(2);
        assert!(GridPayload::decode(&encoded).is_err());
    }

    #[test]
    fn style_bits_decode() {
        let style = style_bits::BOLD | style_bits::STRIKETHROUGH | (2 << 2) | (5 << 5);
        assert_ne!(style & style_bits::BOLD, 0);
        assert_eq!(style_bits::underline_kind(style), 2);
        assert_eq!(style_bits::font_family(style), 5);
    }

    #[test]
    fn parse_run_command() {
        let payload = base64::engine::general_purpose::STANDARD.encode(b"hello");
        let body = format!("run -c ygrid -x 1 -y 2 -w 10 -h 5 -r --name mycard ;; {payload}");
        let (command, decoded) = parse_osc(&body).unwrap();
        assert_eq!(command, Command::Run { card: "mycard".to_string(), x: 1, y: 2, w: 10, h: 5, replace: true });
        assert_eq!(decoded, b"hello");
    }

    #[test]
    fn parse_update_command() {
        let payload = base64::engine::general_purpose::STANDARD.encode(b"abc");
        let body = format!("update --name mycard ;; {payload}");
        let (command, decoded) = parse_osc(&body).unwrap();
        assert_eq!(command, Command::Update { card: "mycard".to_string() });
        assert_eq!(decoded, b"abc");
    }

    #[test]
    fn missing_separator_is_rejected() {
        assert!(parse_osc("run -c ygrid --name foo").is_err());
    }

    #[test]
    fn unknown_verb_is_rejected() {
        let payload = base64::engine::general_purpose::STANDARD.encode(b"x");
        let body = format!("destroy --name foo ;; {payload}");
        assert!(parse_osc(&body).is_err());
    }
}
