use reqwest::multipart::{Form, Part};
use tracing::{debug, info};
use validator::Validate;

use crate::{
    cache::{QueryKey, QueryKind, Reconciler},
    config::Config,
    error::{ClientError, Result},
    models::response::StatusResponse,
    models::user::*,
    services::api::ApiClient,
    utils::validation::{validate_email_format, validate_password_pair},
};

#[derive(Clone)]
pub struct AuthService {
    api: ApiClient,
    reconciler: Reconciler,
    config: Config,
}

impl AuthService {
    pub async fn new(api: ApiClient, reconciler: Reconciler, config: Config) -> Result<Self> {
        Ok(Self { api, reconciler, config })
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse> {
        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        request.validate()?;
        debug!("Logging in: {}", request.email);

        let tokens: TokenResponse = self.api.post("login/", &request).await?;
        self.api.tokens().set(tokens.clone());
        self.reconciler.settle(&[QueryKey::profile().into()]);
        self.reconciler.notices().success("登录成功");
        info!("Logged in as {}", request.email);
        Ok(tokens)
    }

    /// 注册；两次密码必须一致。返回令牌时直接登录
    pub async fn signup(&self, request: SignupRequest) -> Result<SignupResponse> {
        request.validate()?;
        validate_password_pair(&request.password1, &request.password2)?;

        let response: SignupResponse = self.api.post("signup/", &request).await?;
        if let Some(tokens) = &response.token {
            self.api.tokens().set(tokens.clone());
            self.reconciler.settle(&[QueryKey::profile().into()]);
        }
        info!("Signed up: {}", request.email);
        Ok(response)
    }

    pub async fn send_email_code(&self, email: &str) -> Result<EmailCodeResponse> {
        validate_email_format(email)?;
        let request = SendEmailCodeRequest {
            email: email.trim().to_string(),
        };
        let response: EmailCodeResponse = self.api.post("send-email-code/", &request).await?;
        self.report(&response, "验证码已发送，请查收邮件", "发送验证码失败");
        Ok(response)
    }

    pub async fn verify_email_code(&self, email: &str, code: &str) -> Result<EmailCodeResponse> {
        let request = VerifyEmailCodeRequest {
            email: email.trim().to_string(),
            code: code.trim().to_string(),
        };
        request.validate()?;
        let response: EmailCodeResponse = self.api.post("verify-email-code/", &request).await?;
        self.report(&response, "验证码验证成功", "验证码验证失败");
        Ok(response)
    }

    fn report(&self, response: &EmailCodeResponse, success: &str, failure: &str) {
        let notices = self.reconciler.notices();
        match (response.success, response.message.is_empty()) {
            (true, false) => notices.success(response.message.clone()),
            (true, true) => notices.success(success),
            (false, false) => notices.error(response.message.clone()),
            (false, true) => notices.error(failure),
        }
    }

    /// 当前用户资料，缓存时间较长
    pub async fn me(&self) -> Result<Profile> {
        if !self.is_authenticated() {
            return Err(ClientError::unauthorized("未登录"));
        }
        self.reconciler
            .read_within(&QueryKey::profile(), self.config.profile_stale_after(), || {
                self.api.get("me/")
            })
            .await
    }

    pub fn cached_profile(&self) -> Option<Profile> {
        self.reconciler.cache().get_as(&QueryKey::profile()).ok().flatten()
    }

    pub fn is_authenticated(&self) -> bool {
        self.api.tokens().is_authenticated()
    }

    /// 编辑资料；头像可选，作为 `avatar` 文件字段上传
    pub async fn edit_profile(&self, request: EditProfileRequest) -> Result<Profile> {
        request.validate()?;
        let name = request.name.trim();
        if name.is_empty() {
            return Err(ClientError::validation("用户名不能为空"));
        }

        let mut form = Form::new().text("name", name.to_string());
        if let Some(bio) = request.bio {
            form = form.text("bio", bio);
        }
        if let Some(show) = request.show_likes_to_others {
            form = form.text("show_likes_to_others", if show { "true" } else { "false" });
        }
        if let Some(avatar) = request.avatar {
            let part = Part::bytes(avatar.bytes)
                .file_name(avatar.file_name)
                .mime_str(&avatar.mime_type)?;
            form = form.part("avatar", part);
        }

        let response: EditProfileResponse = self.api.post_multipart("editprofile/", form).await?;
        info!("Profile updated: {}", response.user.id);

        // 作者名和头像内嵌在帖子里
        self.reconciler.settle(&[
            QueryKey::profile().into(),
            QueryKind::Posts.into(),
            QueryKind::UserPosts.into(),
        ]);
        if response.message.is_empty() {
            self.reconciler.notices().success("个人资料更新成功");
        } else {
            self.reconciler.notices().success(response.message.clone());
        }
        Ok(response.user)
    }

    pub async fn change_password(&self, request: ChangePasswordRequest) -> Result<StatusResponse> {
        request.validate()?;
        if request.new_password != request.confirm_password {
            return Err(ClientError::validation("新密码和确认密码不匹配"));
        }

        let response: StatusResponse = match self.api.post("change-password/", &request).await {
            Ok(response) => response,
            Err(e) => {
                self.reconciler.notices().error(e.user_message());
                return Err(e);
            }
        };
        if !response.success {
            let message = if response.message.is_empty() {
                "密码修改失败".to_string()
            } else {
                response.message.clone()
            };
            self.reconciler.notices().error(message.clone());
            return Err(ClientError::Api { status: 400, message });
        }
        info!("Password changed");
        self.reconciler.notices().success(if response.message.is_empty() {
            "密码修改成功".to_string()
        } else {
            response.message.clone()
        });
        Ok(response)
    }

    pub async fn save_mbti_result(&self, result: &MbtiResult) -> Result<MbtiResult> {
        if result.personality_type.trim().is_empty() {
            return Err(ClientError::validation("缺少性格类型"));
        }
        let response: SaveMbtiResponse = self.api.post("mibt/save/", result).await?;
        debug!("Saved MBTI result: {}", response.result.personality_type);

        self.reconciler.settle(&[
            QueryKey::profile().into(),
            QueryKind::MbtiResult.into(),
        ]);
        Ok(response.result)
    }

    /// 某用户的 MBTI 结果；不传用户时读取当前用户
    pub async fn mbti_result(&self, user_id: Option<&str>) -> Result<MbtiResult> {
        let path = match user_id {
            Some(id) => format!("mibt/{}/", id),
            None => "mibt/".to_string(),
        };
        self.reconciler
            .read(&QueryKey::mbti_result(user_id), || self.api.get(&path))
            .await
    }

    /// 退出登录：清除令牌和全部缓存
    pub fn logout(&self) {
        self.api.tokens().clear();
        self.reconciler.cache().clear();
        self.reconciler.notices().success("已退出登录");
        info!("Logged out");
    }
}
