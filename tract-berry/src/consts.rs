//! 通用常量.

/// peaks 体数据的通道数 (三个主方向, 每个 3 维向量).
pub const PEAK_CHANNELS: usize = 9;

/// 每个 peaks 主方向的向量分量数.
pub const VECTOR_COMPONENTS: usize = 3;

/// 分割 / 端点分割的全局二值化门限.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// 小连通域去除的默认体素数门限.
pub const DEFAULT_BLOB_MIN_SIZE: usize = 50;

/// TOM 向量长度低于该值时视为 "无纤维束", 置零.
pub const DEFAULT_TOM_MIN_LENGTH: f32 = 0.1;

/// 模型内部工作的体素分辨率 (mm).
pub const MODEL_SPACING_MM: f64 = 1.25;

/// 模型输入切片的边长 (体素).
pub const MODEL_INPUT_SIZE: usize = 144;

/// 默认推理批大小.
pub const DEFAULT_BATCH_SIZE: usize = 47;

/// 默认的目标纤维条数.
pub const DEFAULT_TARGET_FIBERS: usize = 2000;

/// tractometry 沿束采样点数.
pub const TRACTOMETRY_POINTS: usize = 100;

/// 纤维束名称表.
pub mod bundles {
    /// 完整的 72 束分类.
    pub const ALL_72: [&str; 72] = [
        "AF_left",
        "AF_right",
        "ATR_left",
        "ATR_right",
        "CA",
        "CC_1",
        "CC_2",
        "CC_3",
        "CC_4",
        "CC_5",
        "CC_6",
        "CC_7",
        "CG_left",
        "CG_right",
        "CST_left",
        "CST_right",
        "MLF_left",
        "MLF_right",
        "FPT_left",
        "FPT_right",
        "FX_left",
        "FX_right",
        "ICP_left",
        "ICP_right",
        "IFO_left",
        "IFO_right",
        "ILF_left",
        "ILF_right",
        "MCP",
        "OR_left",
        "OR_right",
        "POPT_left",
        "POPT_right",
        "SCP_left",
        "SCP_right",
        "SLF_I_left",
        "SLF_I_right",
        "SLF_II_left",
        "SLF_II_right",
        "SLF_III_left",
        "SLF_III_right",
        "STR_left",
        "STR_right",
        "UF_left",
        "UF_right",
        "CC",
        "T_PREF_left",
        "T_PREF_right",
        "T_PREM_left",
        "T_PREM_right",
        "T_PREC_left",
        "T_PREC_right",
        "T_POSTC_left",
        "T_POSTC_right",
        "T_PAR_left",
        "T_PAR_right",
        "T_OCC_left",
        "T_OCC_right",
        "ST_FO_left",
        "ST_FO_right",
        "ST_PREF_left",
        "ST_PREF_right",
        "ST_PREM_left",
        "ST_PREM_right",
        "ST_PREC_left",
        "ST_PREC_right",
        "ST_POSTC_left",
        "ST_POSTC_right",
        "ST_PAR_left",
        "ST_PAR_right",
        "ST_OCC_left",
        "ST_OCC_right",
    ];

    /// TOM (方向场回归) 使用的 20 束分类.
    pub const TOM_20: [&str; 20] = [
        "AF_left",
        "AF_right",
        "ATR_left",
        "ATR_right",
        "CA",
        "CC_1",
        "CC_2",
        "CC_3",
        "CC_4",
        "CC_5",
        "CC_6",
        "CC_7",
        "CG_left",
        "CG_right",
        "CST_left",
        "CST_right",
        "FX_left",
        "FX_right",
        "IFO_left",
        "IFO_right",
    ];

    /// 逐束门限模式下的默认门限表 (经验值, 可整体替换).
    pub const SPECIFIC_THRESHOLDS: [(&str, f32); 5] = [
        ("CA", 0.3),
        ("CST_left", 0.4),
        ("CST_right", 0.4),
        ("FX_left", 0.4),
        ("FX_right", 0.4),
    ];
}
