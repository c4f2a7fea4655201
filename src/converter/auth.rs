//! 账号：邮箱密码登录/注册与访客模式
//!
//! 使用 Firebase 兼容的身份认证 REST 接口（`accounts:signInWithPassword`、
//! `accounts:signUp`）。访客没有用户 ID，不参与云端同步。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::converter::types::handle_http_response;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub email: String,
    pub password: String,
    pub return_secure_token: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub local_id: String,
    pub id_token: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: String,
}

/// 已登录用户
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
    pub id_token: String,
    pub email: String,
}

impl From<AuthResponse> for AuthUser {
    fn from(resp: AuthResponse) -> Self {
        Self {
            user_id: resp.local_id,
            id_token: resp.id_token,
            email: resp.email,
        }
    }
}

/// 当前会话
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Session {
    #[default]
    SignedOut,
    Guest,
    Authenticated(AuthUser),
}

impl Session {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Session::Authenticated(user) => Some(&user.user_id),
            _ => None,
        }
    }

    pub fn id_token(&self) -> Option<&str> {
        match self {
            Session::Authenticated(user) => Some(&user.id_token),
            _ => None,
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Session::Guest)
    }

    /// 登录成功后切换为已认证（同时退出访客模式）
    pub fn sign_in(&mut self, user: AuthUser) {
        info!("[Auth] 会话切换为用户 {}", user.user_id);
        *self = Session::Authenticated(user);
    }

    /// 退出登录；访客模式同样回到未登录
    pub fn sign_out(&mut self) {
        if let Session::Authenticated(user) = self {
            info!("[Auth] 用户 {} 已退出登录", user.user_id);
        }
        *self = Session::SignedOut;
    }

    /// 以访客身份使用，不同步记录；已登录用户会先退出
    pub fn enter_guest(&mut self) {
        self.sign_out();
        *self = Session::Guest;
        debug!("[Auth] 进入访客模式");
    }

    /// 离开访客模式回到未登录，非访客时不变
    pub fn exit_guest(&mut self) {
        if self.is_guest() {
            *self = Session::SignedOut;
            debug!("[Auth] 退出访客模式");
        }
    }
}

fn validate_credentials(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() || !email.contains('@') {
        return Err(anyhow::anyhow!("邮箱格式不正确: {}", email));
    }
    if password.is_empty() {
        return Err(anyhow::anyhow!("密码不能为空"));
    }
    Ok(())
}

async fn post_credentials(
    auth_base_url: &str,
    endpoint: &str,
    api_key: &str,
    email: &str,
    password: &str,
) -> Result<AuthUser> {
    validate_credentials(email, password)?;

    let url = format!(
        "{}/v1/accounts:{}?key={}",
        auth_base_url.trim_end_matches('/'),
        endpoint,
        api_key
    );
    let req = AuthRequest {
        email: email.trim().to_string(),
        password: password.to_string(),
        return_secure_token: true,
    };

    info!("[Auth] 🔐 正在请求 {}...", endpoint);
    debug!("[Auth]   邮箱: {}", req.email);

    let response = reqwest::Client::new()
        .post(&url)
        .header("Content-Type", "application/json")
        .json(&req)
        .send()
        .await
        .context("请求失败")?;

    let resp: AuthResponse = handle_http_response(response, endpoint).await?;

    info!("[Auth] ✅ 认证成功，用户ID: {}", resp.local_id);
    Ok(resp.into())
}

/// 邮箱密码登录
pub async fn sign_in_async(
    auth_base_url: &str,
    api_key: &str,
    email: &str,
    password: &str,
) -> Result<AuthUser> {
    post_credentials(auth_base_url, "signInWithPassword", api_key, email, password).await
}

/// 邮箱密码注册
pub async fn sign_up_async(
    auth_base_url: &str,
    api_key: &str,
    email: &str,
    password: &str,
) -> Result<AuthUser> {
    post_credentials(auth_base_url, "signUp", api_key, email, password).await
}
