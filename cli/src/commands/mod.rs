mod diary;
mod helpers;
mod weather;

pub(crate) use diary::{cmd_delete, cmd_edit, cmd_range, cmd_read, cmd_write};
pub(crate) use weather::cmd_weather;
