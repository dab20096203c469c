//! Text Safety Port - 文本安全分类与语言检测模型

use std::fs::File;

use serde::{Deserialize, Serialize};

/// 辅助模型的资源文件
#[derive(Debug, Default)]
pub struct SafetyAssets {
    /// 安全分类模型数据
    pub safety_data: Option<File>,
    /// 分词模型（与安全分类模型配套）
    pub sp_model: Option<File>,
    /// 语言检测模型
    pub language_detection: Option<File>,
}

impl SafetyAssets {
    pub fn is_empty(&self) -> bool {
        self.safety_data.is_none() && self.language_detection.is_none()
    }
}

/// 语言检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageDetection {
    pub language: String,
    pub reliability: f32,
}

/// 文本安全分类结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyInfo {
    pub class_scores: Vec<f32>,
}

/// 原生安全模型，只在其专属 worker 上调用
pub trait NativeSafetyModel: Send {
    /// 未加载语言检测模型时返回 None
    fn detect_language(&mut self, text: &str) -> Option<LanguageDetection>;

    /// 未加载安全分类模型时返回 None
    fn classify_text_safety(&mut self, text: &str) -> Option<SafetyInfo>;
}
