#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;

pub mod field;
pub mod layout;

pub use field::{
    clear_field, decode_from, encode_into, encoded_len, read_field, read_field_vec, read_len,
    skip_field, write_cstr_field, write_field, LEN_PREFIX,
};
pub use layout::BondLayout;
