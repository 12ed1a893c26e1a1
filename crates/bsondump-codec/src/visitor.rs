use crate::node::Node;

/// 访问者对单个节点的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// 继续解码下一个元素
    Continue,
    /// 停止解码，视为正常结束
    Stop,
    /// 中止解码并把错误码交给调用方
    Error(i32),
}

/// 节点访问者
///
/// 解码器每解析出一个元素就调用一次 `visit`。节点只在本次调用期间有效。
pub trait Visitor {
    fn visit(&mut self, node: &Node<'_>) -> Visit;
}

impl<F> Visitor for F
where
    F: FnMut(&Node<'_>) -> Visit,
{
    fn visit(&mut self, node: &Node<'_>) -> Visit {
        self(node)
    }
}
