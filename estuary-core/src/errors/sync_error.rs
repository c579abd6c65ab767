/// Client-session errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("lost head race after {attempts} push attempts")]
    RaceLost { attempts: u32 },
}
