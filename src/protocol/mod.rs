//! Protocol Module
//!
//! Defines the wire protocol between `RemoteStore` and `atlaslock-server`.
//!
//! ## Protocol Format (V1 - Simple Binary)
//!
//! ### Request Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Commands
//! - 0x01: GET                 - OK(value) or NOT_FOUND
//! - 0x02: SET_NX_PX           - OK(flag)
//! - 0x03: COMPARE_AND_DEL     - OK(flag)
//! - 0x04: PING                - OK("PONG")
//! - 0x05: PEXPIRE             - OK(flag)
//! - 0x06: PTTL                - OK(i64: -2 missing, -1 persistent, else ms)
//! - 0x07: COMPARE_AND_PEXPIRE - OK(flag)
//! - 0x08: SET                 - OK
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Status Codes
//! - 0x00: OK
//! - 0x01: NOT_FOUND
//! - 0x02: ERROR

mod command;
mod response;
mod codec;

pub use command::{Command, CommandType};
pub use response::{Response, Status};
pub use codec::{
    decode_command, decode_response, encode_command, encode_response, read_command,
    read_response, write_command, write_response, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
