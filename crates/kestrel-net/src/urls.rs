use crate::error::ClientError;

pub fn validated_base(base_url: &str) -> Result<String, ClientError> {
    let trimmed = base_url.trim();
    let host = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .ok_or_else(|| ClientError::InvalidBaseUrl(base_url.to_string()))?;
    if host.trim_end_matches('/').is_empty() {
        return Err(ClientError::InvalidBaseUrl(base_url.to_string()));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

// Routes take an already validated base.

pub fn conversations(base: &str) -> String {
    format!("{}/api/v0/get-all-user-message-threads", base)
}

pub fn direct_thread(base: &str) -> String {
    format!("{}/api/v0/get-paginated-messages-for-dm-thread", base)
}

pub fn group_thread(base: &str) -> String {
    format!("{}/api/v0/get-paginated-messages-for-group-chat-thread", base)
}

pub fn group_members(base: &str) -> String {
    format!("{}/api/v0/get-paginated-access-group-members", base)
}

pub fn send_message(base: &str) -> String {
    format!("{}/api/v0/send-dm-message", base)
}

pub fn profiles(base: &str) -> String {
    format!("{}/api/v0/get-users-stateless", base)
}
