/// 验证码中的运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
}

impl Operator {
    /// 计算结果；溢出时返回 `None`
    pub fn apply(self, lhs: i64, rhs: i64) -> Option<i64> {
        match self {
            Operator::Add => lhs.checked_add(rhs),
            Operator::Subtract => lhs.checked_sub(rhs),
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Subtract => '-',
        }
    }
}

/// 一次登录尝试中的验证码挑战（仅在该次尝试内有效）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaChallenge {
    pub image: Vec<u8>,
    pub recognized_text: String,
    pub operands: [i64; 2],
    pub operator: Operator,
    pub computed_answer: i64,
    pub attempt_index: u32,
}
