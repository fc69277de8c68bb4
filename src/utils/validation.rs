use crate::error::{ClientError, Result};

/// 验证邮箱并返回详细错误信息
pub fn validate_email_format(email: &str) -> Result<()> {
    if email.trim().is_empty() {
        return Err(ClientError::Validation("邮箱不能为空".to_string()));
    }

    if !validator::validate_email(email) {
        return Err(ClientError::Validation("邮箱格式不正确".to_string()));
    }

    if email.len() > 254 {
        return Err(ClientError::Validation("邮箱地址过长".to_string()));
    }

    Ok(())
}

/// 验证正文（帖子、评论、私信），返回去掉首尾空白后的内容
///
/// 长度按字符计算。
pub fn validate_body(body: &str, max_chars: usize, empty_message: &str) -> Result<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ClientError::Validation(empty_message.to_string()));
    }

    if trimmed.chars().count() > max_chars {
        return Err(ClientError::Validation(format!("内容不能超过{}个字符", max_chars)));
    }

    Ok(trimmed.to_string())
}

/// 两次输入的密码必须一致，且至少8位
pub fn validate_password_pair(password1: &str, password2: &str) -> Result<()> {
    if password1.chars().count() < 8 {
        return Err(ClientError::Validation("密码至少需要8个字符".to_string()));
    }

    if password1 != password2 {
        return Err(ClientError::Validation("两次输入的密码不一致".to_string()));
    }

    Ok(())
}

/// 按字符截断
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
