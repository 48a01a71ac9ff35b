//! 简化选项与线路请求体
//!
//! tone/depth/profession 三个旋钮调节发给上游模型的系统指令；
//! 未知或缺失的取值回落到文档化的默认值（tone→12，depth→medium，
//! profession→空）。

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 单次请求的文本长度上限（字符数）
pub const MAX_TEXT_CHARS: usize = 5000;

/// profession 字段长度上限（字符数）
pub const MAX_PROFESSION_CHARS: usize = 200;

/// 目标语气：阅读水平人设
///
/// 线路编码为异构 JSON：`"baby" | 5 | 12 | 18 | "big_boy"`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tone {
    Baby,
    Five,
    #[default]
    Twelve,
    Eighteen,
    BigBoy,
}

impl Tone {
    /// 系统指令中使用的人设描述
    pub fn persona(&self) -> &'static str {
        match self {
            Tone::Baby => "a very young child hearing this for the first time",
            Tone::Five => "a curious five-year-old",
            Tone::Twelve => "a smart twelve-year-old",
            Tone::Eighteen => "a college freshman",
            Tone::BigBoy => "a busy adult who wants it short and plain",
        }
    }
}

impl Serialize for Tone {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Tone::Baby => serializer.serialize_str("baby"),
            Tone::Five => serializer.serialize_u64(5),
            Tone::Twelve => serializer.serialize_u64(12),
            Tone::Eighteen => serializer.serialize_u64(18),
            Tone::BigBoy => serializer.serialize_str("big_boy"),
        }
    }
}

struct ToneVisitor;

impl Visitor<'_> for ToneVisitor {
    type Value = Tone;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"baby\", 5, 12, 18 or \"big_boy\"")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Tone, E> {
        match value {
            5 => Ok(Tone::Five),
            12 => Ok(Tone::Twelve),
            18 => Ok(Tone::Eighteen),
            other => Err(de::Error::invalid_value(
                de::Unexpected::Unsigned(other),
                &self,
            )),
        }
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Tone, E> {
        u64::try_from(value)
            .map_err(|_| de::Error::invalid_value(de::Unexpected::Signed(value), &self))
            .and_then(|v| self.visit_u64(v))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Tone, E> {
        match value {
            "baby" => Ok(Tone::Baby),
            "big_boy" => Ok(Tone::BigBoy),
            other => Err(de::Error::invalid_value(de::Unexpected::Str(other), &self)),
        }
    }
}

impl<'de> Deserialize<'de> for Tone {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Tone, D::Error> {
        deserializer.deserialize_any(ToneVisitor)
    }
}

/// 简化彻底程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Light,
    #[default]
    Medium,
    Detailed,
}

impl Depth {
    /// 系统指令中使用的程度描述
    pub fn directive(&self) -> &'static str {
        match self {
            Depth::Light => "Make only light edits; keep the original wording where it is already clear.",
            Depth::Medium => "Rewrite for clarity, keeping roughly the original length.",
            Depth::Detailed => "Rewrite thoroughly and expand explanations where they help understanding.",
        }
    }
}

/// 简化选项
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimplifyOptions {
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub depth: Depth,
    #[serde(default)]
    pub profession: String,
}

/// `/api/simplify` 请求体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimplifyRequest {
    pub text: String,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub depth: Depth,
    #[serde(default)]
    pub profession: String,
}

impl SimplifyRequest {
    /// 由文本与选项组装请求体
    pub fn new(text: String, options: &SimplifyOptions) -> Self {
        Self {
            text,
            tone: options.tone,
            depth: options.depth,
            profession: options.profession.clone(),
        }
    }

    /// 拆出选项部分
    pub fn options(&self) -> SimplifyOptions {
        SimplifyOptions {
            tone: self.tone,
            depth: self.depth,
            profession: self.profession.clone(),
        }
    }
}
