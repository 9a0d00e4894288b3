use crate::error::Result;

/// First payload byte of a command-phase client packet.
// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/my__command_8h.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Quit = 0x01,
    InitDb = 0x02,
    Query = 0x03,
    Statistics = 0x09,
    Debug = 0x0D,
    Ping = 0x0E,
    ChangeUser = 0x11,
    StmtPrepare = 0x16,
    StmtExecute = 0x17,
    StmtSendLongData = 0x18,
    StmtClose = 0x19,
    StmtReset = 0x1A,
    SetOption = 0x1B,
    StmtFetch = 0x1C,
    ResetConnection = 0x1F,
}

impl Command {
    pub fn try_from_u8(id: u8) -> Result<Self> {
        Ok(match id {
            0x01 => Command::Quit,
            0x02 => Command::InitDb,
            0x03 => Command::Query,
            0x09 => Command::Statistics,
            0x0D => Command::Debug,
            0x0E => Command::Ping,
            0x11 => Command::ChangeUser,
            0x16 => Command::StmtPrepare,
            0x17 => Command::StmtExecute,
            0x18 => Command::StmtSendLongData,
            0x19 => Command::StmtClose,
            0x1A => Command::StmtReset,
            0x1B => Command::SetOption,
            0x1C => Command::StmtFetch,
            0x1F => Command::ResetConnection,

            id => {
                return Err(err_protocol!("unknown command byte 0x{:02X}", id));
            }
        })
    }
}
