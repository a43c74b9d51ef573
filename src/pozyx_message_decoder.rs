//! Encoding of register access commands and decoding of the lines a Pozyx
//! device sends back over its USB serial interface.
//!
//! Commands are single ASCII lines terminated by `\r`:
//!
//! ```text
//! R,<register>,<length>            read <length> bytes from <register>
//! W,<register>,<hex data>          write bytes to <register>
//! F,<register>,<hex params>,<len>  call the register function, expecting <len> bytes back
//! ```
//!
//! The device answers each command with `D,<hex data>\r\n`, or a line
//! starting with `E` when it could not parse the command.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while_m_n},
    character::complete::{char, multispace0, not_line_ending},
    combinator::{all_consuming, map, map_res, opt},
    error::Error,
    multi::many0,
    sequence::{preceded, terminated, tuple},
    Finish, IResult,
};

use std::{fmt::Write, str::FromStr};

/// A decoded response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PozyxResponse {
    /// Raw bytes, in the order the device sent them
    Data(Vec<u8>),
    /// The device rejected the command
    Error(String),
}

fn parse_hex_byte(s: &str) -> IResult<&str, u8> {
    map_res(
        take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
        |h: &str| u8::from_str_radix(h, 16),
    )(s)
}

fn parse_data(s: &str) -> IResult<&str, PozyxResponse> {
    map(preceded(tag("D,"), many0(parse_hex_byte)), PozyxResponse::Data)(s)
}

fn parse_error(s: &str) -> IResult<&str, PozyxResponse> {
    map(
        preceded(tuple((char('E'), opt(char(',')))), not_line_ending),
        |msg: &str| PozyxResponse::Error(msg.trim().to_owned()),
    )(s)
}

fn parse_response(s: &str) -> IResult<&str, PozyxResponse> {
    all_consuming(terminated(alt((parse_data, parse_error)), multispace0))(s)
}

impl FromStr for PozyxResponse {
    type Err = Error<String>;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_response(s).finish() {
            Ok((_remaining, response)) => Ok(response),
            Err(Error { input, code }) => Err(Error {
                input: input.to_string(),
                code,
            }),
        }
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().fold(String::new(), |mut out, b| {
        // Writing to a String cannot fail.
        let _ = write!(out, "{:02x}", b);
        out
    })
}

/// `R,<register>,<length>\r`
pub fn encode_read(register: u8, length: usize) -> String {
    format!("R,{:02x},{}\r", register, length)
}

/// `W,<register>,<hex data>\r`
pub fn encode_write(register: u8, data: &[u8]) -> String {
    format!("W,{:02x},{}\r", register, hex_string(data))
}

/// `F,<register>,<hex params>,<response length>\r`. The response length
/// counts the leading status byte.
pub fn encode_function(register: u8, params: &[u8], response_len: usize) -> String {
    format!(
        "F,{:02x},{},{}\r",
        register,
        hex_string(params),
        response_len + 1
    )
}
