//! Shared constants

pub mod ai {
    pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
    pub const MAX_OUTPUT_TOKENS: usize = 4096;
    pub const OPENAI_CHAT_API: &str = "https://api.openai.com/v1/chat/completions";
    pub const ANTHROPIC_MESSAGES_API: &str = "https://api.anthropic.com/v1/messages";
    pub const ANTHROPIC_API_VERSION: &str = "2023-06-01";
    pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
}

pub mod agent {
    pub const MAX_ITERATIONS: u64 = 25;
    pub const MAX_ERRORS: u64 = 3;
    pub const MAX_TOOL_OUTPUT_CHARS: usize = 30_000;
    /// Built-in tool the model calls when it needs the user to answer
    pub const ASK_USER_TOOL: &str = "ask_user";
    pub const DEFAULT_SYSTEM_INSTRUCTIONS: &str = "You are a desktop assistant. Fulfil the user's \
request by calling the available tools. When the request is complete, reply with a short \
confirmation and no tool calls. If you need information only the user can provide, call \
the ask_user tool.";
}

pub mod timeouts {
    pub const LLM_SECS: u64 = 120;
    pub const CONNECT_SECS: u64 = 30;
    pub const LIST_TOOLS_SECS: u64 = 30;
    pub const INVOKE_SECS: u64 = 60;
    pub const USER_INPUT_SECS: u64 = 300;
}

pub mod mcp {
    pub const PROTOCOL_VERSION: &str = "2024-11-05";
    pub const DEFAULT_CLIENT_NAME: &str = "relay";
    pub const HTTP_PATH: &str = "/mcp";
    pub const SESSION_HEADER: &str = "mcp-session-id";
}

pub mod paths {
    pub const CONFIG_DIR_NAME: &str = ".relay";
    pub const SERVERS_FILE: &str = "servers.json";
    pub const CONFIG_FILE: &str = "config.toml";
    pub const HOME_ENV: &str = "RELAY_HOME";
}
