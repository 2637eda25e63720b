pub mod remaining_length;
pub mod string;

pub use remaining_length::{
    decode_remaining_length, encode_remaining_length, peek_remaining_length,
    remaining_length_len, REMAINING_LENGTH_MAX,
};
pub use string::{decode_string, encode_string, string_len};
