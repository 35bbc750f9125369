mod code_block;
mod layout;
