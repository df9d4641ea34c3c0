//! Recursive-descent parser producing the attributed statement tree.
//!
//! Expressions use precedence climbing across levels 17 (lowest: comma)
//! down to 01 (primary/member/call/subscript); the level numbering and the
//! per-level functions mirror the grammar table. Three constructs never
//! reach the tree as themselves:
//!
//! - `defer expr` accumulates in a per-function stack of per-block frames;
//!   clones of the deferred statements are spliced in before every `return`
//!   (whole function, reverse order of registration) and at the end of each
//!   block (that block's frame only).
//! - `while cond { .. }` desugars to `for ; cond ; { .. }`.
//! - `for it in expr { .. }` desugars to the iterator protocol block using
//!   `begin`/`end`/`next`/`at` member calls, with synthetic names derived
//!   from the user's iterator name.

use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;

use crate::{
    ast::{Conditional, StmtId, StmtKind, StmtMask},
    context::Context,
    diag::{Halted, SemResult},
    lex::{Lexeme, Payload, Tok},
    loc::{ModuleId, ModuleLoc},
};

/// Presence requirement for a `parse_var` component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occurs {
    Yes,
    No,
    Maybe,
}

/// A block's deferred statements; nearly always one or two.
type DeferFrame = SmallVec<[StmtId; 2]>;

/// Parse-time defer registry: functions hold frames, frames hold the
/// deferred statements in registration order.
#[derive(Default)]
struct DeferStack {
    funcs: Vec<Vec<DeferFrame>>,
}

impl DeferStack {
    fn push_func(&mut self) {
        self.funcs.push(Vec::new());
    }

    fn pop_func(&mut self) {
        self.funcs.pop();
    }

    fn push_frame(&mut self) {
        if let Some(f) = self.funcs.last_mut() {
            f.push(DeferFrame::new());
        }
    }

    fn pop_frame(&mut self) {
        if let Some(f) = self.funcs.last_mut() {
            f.pop();
        }
    }

    fn add(&mut self, stmt: StmtId) -> bool {
        match self.funcs.last_mut().and_then(|f| f.last_mut()) {
            Some(frame) => {
                frame.push(stmt);
                true
            }
            None => false,
        }
    }

    /// Every outstanding deferred statement of the current function, in
    /// reverse registration order.
    fn all_stmts(&self) -> Vec<StmtId> {
        let mut res: Vec<StmtId> = self
            .funcs
            .last()
            .map(|frames| frames.iter().flatten().copied().collect())
            .unwrap_or_default();
        res.reverse();
        res
    }

    /// The current block's deferred statements, in reverse order.
    fn top_stmts(&self) -> Vec<StmtId> {
        let mut res: Vec<StmtId> = self
            .funcs
            .last()
            .and_then(|frames| frames.last())
            .map(|frame| frame.to_vec())
            .unwrap_or_default();
        res.reverse();
        res
    }
}

struct Cursor {
    toks: Vec<Lexeme>,
    pos: usize,
    eof: Lexeme,
}

impl Cursor {
    fn new(toks: Vec<Lexeme>, module: ModuleId, src_len: usize) -> Self {
        let eof = Lexeme::new(ModuleLoc::new(module, src_len), Tok::Eof);
        Self { toks, pos: 0, eof }
    }

    fn peek(&self) -> &Lexeme {
        self.peek_at(0)
    }

    fn peek_at(&self, off: usize) -> &Lexeme {
        self.toks.get(self.pos + off).unwrap_or(&self.eof)
    }

    fn peek_tok(&self) -> Tok {
        self.peek().tok
    }

    fn peek_tok_at(&self, off: usize) -> Tok {
        self.peek_at(off).tok
    }

    fn loc(&self) -> ModuleLoc {
        self.peek().loc
    }

    fn next(&mut self) {
        self.pos += 1;
    }

    fn prev(&self) -> &Lexeme {
        self.toks.get(self.pos.wrapping_sub(1)).unwrap_or(&self.eof)
    }

    fn valid(&self) -> bool {
        self.pos < self.toks.len()
    }

    fn accept(&self, t: Tok) -> bool {
        self.peek_tok() == t
    }

    fn accept2(&self, a: Tok, b: Tok) -> bool {
        let t = self.peek_tok();
        t == a || t == b
    }

    fn acceptn(&mut self, t: Tok) -> bool {
        if self.accept(t) {
            self.next();
            return true;
        }
        false
    }

    fn accept_data(&self) -> bool {
        self.peek_tok().is_data()
    }

    /// Retags the current token in place (`(` -> call, `[` -> subscript).
    fn retag(&mut self, t: Tok) {
        if let Some(l) = self.toks.get_mut(self.pos) {
            l.tok = t;
        }
    }
}

pub(crate) struct Parser<'cx> {
    cx: &'cx mut Context,
    cur: Cursor,
    defers: DeferStack,
}

/// Parses a module's token stream into its top-level block.
pub(crate) fn parse(
    cx: &mut Context,
    module: ModuleId,
    toks: Vec<Lexeme>,
    src_len: usize,
) -> SemResult<StmtId> {
    let mut p = Parser {
        cx,
        cur: Cursor::new(toks, module, src_len),
        defers: DeferStack::default(),
    };
    p.parse_block(false)
}

impl Parser<'_> {
    fn err_here(&mut self, msg: impl Into<String>) -> Halted {
        let loc = self.cur.loc();
        self.cx.err_loc(loc, msg)
    }

    fn expected(&mut self, what: &str) -> Halted {
        let found = self.cur.peek_tok().as_str();
        self.err_here(format!("expected {what}, found: {found}"))
    }

    fn alloc(&mut self, loc: ModuleLoc, kind: StmtKind) -> StmtId {
        self.cx.stmts.alloc(loc, kind)
    }

    // ------------------------------------------------------------------
    // statements
    // ------------------------------------------------------------------

    /// With `with_brace` false this parses a module top block (no braces,
    /// runs to EOF, gets its own defer function frame).
    fn parse_block(&mut self, with_brace: bool) -> SemResult<StmtId> {
        let start = self.cur.loc();
        if with_brace && !self.cur.acceptn(Tok::LBrace) {
            return Err(self.expected("opening brace '{' for block"));
        }
        if !with_brace {
            self.defers.push_func();
        }
        self.defers.push_frame();

        let mut stmts: Vec<StmtId> = Vec::new();
        let mut inserted_defers = false;
        while self.cur.valid() && (!with_brace || !self.cur.accept(Tok::RBrace)) {
            let attrs = if self.cur.accept(Tok::Hash) {
                Some(self.parse_attrs()?)
            } else {
                None
            };
            let mut skip_cols = false;
            let mut stmt = None;
            match self.cur.peek_tok() {
                Tok::Let => stmt = Some(self.parse_vardecl()?),
                Tok::If => {
                    stmt = Some(self.parse_conds(false)?);
                    skip_cols = true;
                }
                Tok::Inline => match self.cur.peek_tok_at(1) {
                    Tok::For => {
                        self.cur.next();
                        stmt = Some(self.parse_for(true)?);
                        skip_cols = true;
                    }
                    Tok::If => {
                        self.cur.next();
                        stmt = Some(self.parse_conds(true)?);
                        skip_cols = true;
                    }
                    other => {
                        return Err(self.err_here(format!(
                            "'inline' is not applicable on '{}' statement",
                            other.as_str()
                        )));
                    }
                },
                Tok::For => {
                    if self.cur.peek_tok_at(1) == Tok::Iden && self.cur.peek_tok_at(2) == Tok::In {
                        stmt = Some(self.parse_forin()?);
                    } else {
                        stmt = Some(self.parse_for(false)?);
                    }
                    skip_cols = true;
                }
                Tok::While => {
                    stmt = Some(self.parse_while()?);
                    skip_cols = true;
                }
                Tok::Return => {
                    let ret = self.parse_ret()?;
                    // hoist every outstanding defer of this function ahead
                    // of the return, once per block
                    if !inserted_defers {
                        for d in self.defers.all_stmts() {
                            let clone = self.cx.stmts.clone_deep(d);
                            stmts.push(clone);
                        }
                        inserted_defers = true;
                    }
                    stmt = Some(ret);
                }
                Tok::Continue => stmt = Some(self.parse_continue()?),
                Tok::Break => stmt = Some(self.parse_break()?),
                Tok::Defer => {
                    self.parse_defer()?;
                }
                Tok::LBrace => {
                    stmt = Some(self.parse_block(true)?);
                    skip_cols = true;
                }
                _ => stmt = Some(self.parse_expr(false)?),
            }

            if !skip_cols && !self.cur.acceptn(Tok::ColS) {
                return Err(self.expected("semicolon for end of statement"));
            }
            if let Some(s) = stmt {
                if let Some(a) = attrs {
                    self.cx.stmts.get_mut(s).attrs = Some(Box::new(a));
                }
                stmts.push(s);
            }
        }

        if with_brace && !self.cur.acceptn(Tok::RBrace) {
            return Err(self.expected("closing brace '}' for block"));
        }

        // this block's own deferred statements run at block exit, unless a
        // return already hoisted the whole function's defers
        if !inserted_defers {
            for d in self.defers.top_stmts() {
                let clone = self.cx.stmts.clone_deep(d);
                stmts.push(clone);
            }
        }
        self.defers.pop_frame();
        if !with_brace {
            self.defers.pop_func();
        }

        Ok(self.alloc(
            start,
            StmtKind::Block {
                stmts,
                is_top: !with_brace,
                layering_disabled: false,
            },
        ))
    }

    /// `#[key = value, flag]` attached to the following statement.
    fn parse_attrs(&mut self) -> SemResult<AHashMap<String, String>> {
        self.cur.next(); // '#'
        if !self.cur.acceptn(Tok::LBrack) {
            return Err(self.expected("'[' after '#' for attribute list"));
        }
        let mut attrs = AHashMap::new();
        while self.cur.accept(Tok::Iden) {
            let key = self.cur.peek().str_data().to_owned();
            self.cur.next();
            let mut val = String::new();
            if self.cur.acceptn(Tok::Assn) {
                let lex = self.cur.peek().clone();
                val = match (lex.tok, &lex.data) {
                    (Tok::Iden | Tok::Str, Payload::Str(s)) => s.clone(),
                    (Tok::Int, Payload::Int(i)) => i.to_string(),
                    (Tok::Flt, Payload::Flt(f)) => f.to_string(),
                    _ => return Err(self.expected("identifier, string or number for attribute value")),
                };
                self.cur.next();
            }
            attrs.insert(key, val);
            if !self.cur.acceptn(Tok::Comma) {
                break;
            }
        }
        if !self.cur.acceptn(Tok::RBrack) {
            return Err(self.expected("']' to close attribute list"));
        }
        Ok(attrs)
    }

    /// `[...] [*]* [&] [static] [const] [volatile] expr`, or a function
    /// signature type.
    fn parse_type(&mut self) -> SemResult<StmtId> {
        let start = self.cur.loc();
        let mut mask = StmtMask::empty();

        if self.cur.accept(Tok::Fn) || (self.cur.accept(Tok::Comptime) && self.cur.peek_tok_at(1) == Tok::Fn)
        {
            if self.cur.acceptn(Tok::Comptime) {
                mask |= StmtMask::COMPTIME;
            }
            let sig = self.parse_fnsig()?;
            let ty = self.alloc(
                start,
                StmtKind::Type {
                    ptr: 0,
                    variadic: false,
                    expr: sig,
                },
            );
            self.cx.stmts.get_mut(ty).mask = mask;
            return Ok(ty);
        }

        let variadic = self.cur.acceptn(Tok::PreVA);
        let mut ptr: u16 = 0;
        while self.cur.acceptn(Tok::Mul) {
            ptr += 1;
        }
        if self.cur.acceptn(Tok::BAnd) {
            mask |= StmtMask::REF;
        }
        if self.cur.acceptn(Tok::Static) {
            mask |= StmtMask::STATIC;
        }
        if self.cur.acceptn(Tok::Const) {
            mask |= StmtMask::CONST;
        }
        if self.cur.acceptn(Tok::Volatile) {
            mask |= StmtMask::VOLATILE;
        }
        if self.cur.acceptn(Tok::Comptime) {
            mask |= StmtMask::COMPTIME;
        }

        let expr = self.parse_expr_01(true)?;
        let ty = self.alloc(start, StmtKind::Type { ptr, variadic, expr });
        self.cx.stmts.get_mut(ty).mask = mask;
        Ok(ty)
    }

    fn parse_simple(&mut self) -> SemResult<StmtId> {
        if !self.cur.accept_data() {
            return Err(self.expected("data here"));
        }
        let lex = self.cur.peek().clone();
        self.cur.next();
        Ok(self.alloc(
            lex.loc,
            StmtKind::Simple {
                lex,
                decl: None,
                self_of: None,
                applied_module_id: false,
            },
        ))
    }

    // ------------------------------------------------------------------
    // expressions, precedence levels 17 (lowest) .. 01 (highest)
    // ------------------------------------------------------------------

    fn parse_expr(&mut self, disable_brace: bool) -> SemResult<StmtId> {
        self.parse_expr_17(disable_brace)
    }

    fn mk_expr(
        &mut self,
        loc: ModuleLoc,
        lhs: StmtId,
        oper: Lexeme,
        rhs: Option<StmtId>,
        is_intrinsic: bool,
    ) -> StmtId {
        self.alloc(
            loc,
            StmtKind::Expr {
                commas: 0,
                lhs: Some(lhs),
                oper,
                rhs,
                or_blk: None,
                or_blk_var: None,
                is_intrinsic,
                called_fn: None,
            },
        )
    }

    /// `,` (left associative)
    fn parse_expr_17(&mut self, disable_brace: bool) -> SemResult<StmtId> {
        let start = self.cur.loc();
        let mut commas: u16 = 0;
        let mut rhs = self.parse_expr_16(disable_brace)?;
        while self.cur.accept(Tok::Comma) {
            commas += 1;
            let oper = self.cur.peek().clone();
            self.cur.next();
            let lhs = self.parse_expr_16(disable_brace)?;
            rhs = self.mk_expr(start, lhs, oper, Some(rhs), false);
        }
        if let StmtKind::Expr { commas: c, .. } = &mut self.cx.stmts.get_mut(rhs).kind {
            *c = commas;
        }
        Ok(rhs)
    }

    /// `?:` ternary
    fn parse_expr_16(&mut self, disable_brace: bool) -> SemResult<StmtId> {
        let start = self.cur.loc();
        let lhs = self.parse_expr_15(disable_brace)?;
        if !self.cur.accept(Tok::Quest) {
            return Ok(lhs);
        }
        let oper = self.cur.peek().clone();
        self.cur.next();
        let then_val = self.parse_expr_15(disable_brace)?;
        if !self.cur.accept(Tok::Col) {
            return Err(self.expected("':' for ternary operator"));
        }
        let oper_inside = self.cur.peek().clone();
        self.cur.next();
        let else_val = self.parse_expr_15(disable_brace)?;
        let rhs = self.mk_expr(oper.loc, then_val, oper_inside, Some(else_val), false);
        Ok(self.mk_expr(start, lhs, oper, Some(rhs), false))
    }

    /// `=` (right associative)
    fn parse_expr_15(&mut self, disable_brace: bool) -> SemResult<StmtId> {
        let start = self.cur.loc();
        let mut rhs = self.parse_expr_14(disable_brace)?;
        while self.cur.accept(Tok::Assn) {
            let oper = self.cur.peek().clone();
            self.cur.next();
            let lhs = self.parse_expr_14(disable_brace)?;
            rhs = self.mk_expr(start, lhs, oper, Some(rhs), false);
        }
        Ok(rhs)
    }

    /// compound assignments, plus the trailing `or` fallback block
    fn parse_expr_14(&mut self, disable_brace: bool) -> SemResult<StmtId> {
        let start = self.cur.loc();
        let mut lhs = self.parse_expr_13(disable_brace)?;
        while matches!(
            self.cur.peek_tok(),
            Tok::AddAssn
                | Tok::SubAssn
                | Tok::MulAssn
                | Tok::DivAssn
                | Tok::ModAssn
                | Tok::LShiftAssn
                | Tok::RShiftAssn
                | Tok::BAndAssn
                | Tok::BOrAssn
                | Tok::BNotAssn
                | Tok::BXorAssn
        ) {
            let oper = self.cur.peek().clone();
            self.cur.next();
            let rhs = self.parse_expr_13(disable_brace)?;
            lhs = self.mk_expr(start, lhs, oper, Some(rhs), false);
        }

        if !self.cur.acceptn(Tok::Or) {
            return Ok(lhs);
        }
        let mut or_var = None;
        if self.cur.accept(Tok::Iden) {
            or_var = Some(self.cur.peek().clone());
            self.cur.next();
        }
        let or_blk = self.parse_block(true)?;
        if !matches!(self.cx.stmts.get(lhs).kind, StmtKind::Expr { .. }) {
            let oper = Lexeme::new(self.cx.stmts.loc(lhs), Tok::Invalid);
            lhs = self.mk_expr(self.cx.stmts.loc(lhs), lhs, oper, None, false);
        }
        if let StmtKind::Expr {
            or_blk: ob,
            or_blk_var: ov,
            ..
        } = &mut self.cx.stmts.get_mut(lhs).kind
        {
            *ob = Some(or_blk);
            *ov = or_var;
        }
        Ok(lhs)
    }

    fn parse_binary<F>(
        &mut self,
        disable_brace: bool,
        accepts: fn(Tok) -> bool,
        mut lower: F,
    ) -> SemResult<StmtId>
    where
        F: FnMut(&mut Self, bool) -> SemResult<StmtId>,
    {
        let start = self.cur.loc();
        let mut lhs = lower(self, disable_brace)?;
        while accepts(self.cur.peek_tok()) {
            let oper = self.cur.peek().clone();
            self.cur.next();
            let rhs = lower(self, disable_brace)?;
            lhs = self.mk_expr(start, lhs, oper, Some(rhs), false);
        }
        Ok(lhs)
    }

    /// `||`
    fn parse_expr_13(&mut self, disable_brace: bool) -> SemResult<StmtId> {
        self.parse_binary(disable_brace, |t| t == Tok::LOr, Self::parse_expr_12)
    }

    /// `&&`
    fn parse_expr_12(&mut self, disable_brace: bool) -> SemResult<StmtId> {
        self.parse_binary(disable_brace, |t| t == Tok::LAnd, Self::parse_expr_11)
    }

    /// `|`
    fn parse_expr_11(&mut self, disable_brace: bool) -> SemResult<StmtId> {
        self.parse_binary(disable_brace, |t| t == Tok::BOr, Self::parse_expr_10)
    }

    /// `^`
    fn parse_expr_10(&mut self, disable_brace: bool) -> SemResult<StmtId> {
        self.parse_binary(disable_brace, |t| t == Tok::BXor, Self::parse_expr_09)
    }

    /// `&`
    fn parse_expr_09(&mut self, disable_brace: bool) -> SemResult<StmtId> {
        self.parse_binary(disable_brace, |t| t == Tok::BAnd, Self::parse_expr_08)
    }

    /// `==` `!=`
    fn parse_expr_08(&mut self, disable_brace: bool) -> SemResult<StmtId> {
        self.parse_binary(
            disable_brace,
            |t| matches!(t, Tok::Eq | Tok::Ne),
            Self::parse_expr_07,
        )
    }

    /// `<` `<=` `>` `>=`
    fn parse_expr_07(&mut self, disable_brace: bool) -> SemResult<StmtId> {
        self.parse_binary(
            disable_brace,
            |t| matches!(t, Tok::Lt | Tok::Le | Tok::Gt | Tok::Ge),
            Self::parse_expr_06,
        )
    }

    /// `<<` `>>`
    fn parse_expr_06(&mut self, disable_brace: bool) -> SemResult<StmtId> {
        self.parse_binary(
            disable_brace,
            |t| matches!(t, Tok::LShift | Tok::RShift),
            Self::parse_expr_05,
        )
    }

    /// `+` `-`
    fn parse_expr_05(&mut self, disable_brace: bool) -> SemResult<StmtId> {
        self.parse_binary(
            disable_brace,
            |t| matches!(t, Tok::Add | Tok::Sub),
            Self::parse_expr_04,
        )
    }

    /// `*` `/` `%`
    fn parse_expr_04(&mut self, disable_brace: bool) -> SemResult<StmtId> {
        self.parse_binary(
            disable_brace,
            |t| matches!(t, Tok::Mul | Tok::Div | Tok::Mod),
            Self::parse_expr_03,
        )
    }

    /// prefix unary operators; signed integer/float literals fold in place
    fn parse_expr_03(&mut self, disable_brace: bool) -> SemResult<StmtId> {
        let mut opers: Vec<Lexeme> = Vec::new();
        while matches!(
            self.cur.peek_tok(),
            Tok::XInc | Tok::XDec | Tok::Add | Tok::Sub | Tok::Mul | Tok::BAnd | Tok::LNot | Tok::BNot
        ) {
            match self.cur.peek_tok() {
                Tok::XInc => self.cur.retag(Tok::IncX),
                Tok::XDec => self.cur.retag(Tok::DecX),
                Tok::Add => self.cur.retag(Tok::UAdd),
                Tok::Sub => self.cur.retag(Tok::USub),
                Tok::Mul => self.cur.retag(Tok::UMul),
                Tok::BAnd => self.cur.retag(Tok::UAnd),
                _ => {}
            }
            opers.insert(0, self.cur.peek().clone());
            self.cur.next();
        }

        let mut lhs = self.parse_expr_02(disable_brace)?;

        if !opers.is_empty()
            && let StmtKind::Simple { lex, .. } = &mut self.cx.stmts.get_mut(lhs).kind
        {
            match lex.tok {
                Tok::Int => {
                    while opers.first().is_some_and(|o| o.tok == Tok::USub) {
                        lex.data = Payload::Int(-lex.data.as_int());
                        opers.remove(0);
                    }
                }
                Tok::Flt => {
                    while opers.first().is_some_and(|o| o.tok == Tok::USub) {
                        lex.data = Payload::Flt(-lex.data.as_flt());
                        opers.remove(0);
                    }
                }
                _ => {}
            }
        }

        for op in opers {
            lhs = self.mk_expr(op.loc, lhs, op, None, false);
        }
        Ok(lhs)
    }

    /// postfix `++` `--` and `...` (variadic length/unpack)
    fn parse_expr_02(&mut self, disable_brace: bool) -> SemResult<StmtId> {
        let mut lhs = self.parse_expr_01(disable_brace)?;
        if matches!(self.cur.peek_tok(), Tok::XInc | Tok::XDec | Tok::PreVA) {
            if self.cur.peek_tok() == Tok::PreVA {
                self.cur.retag(Tok::PostVA);
            }
            let oper = self.cur.peek().clone();
            self.cur.next();
            lhs = self.mk_expr(oper.loc, lhs, oper, None, false);
        }
        Ok(lhs)
    }

    /// primary expressions plus member access, calls, struct instantiation
    /// and subscripts, chained arbitrarily.
    fn parse_expr_01(&mut self, disable_brace: bool) -> SemResult<StmtId> {
        let mut lhs: Option<StmtId> = None;
        if self.cur.acceptn(Tok::LParen) {
            let inner = self.parse_expr(disable_brace)?;
            if !self.cur.acceptn(Tok::RParen) {
                return Err(self.expected("closing parenthesis ')' for expression"));
            }
            lhs = Some(inner);
        }

        let is_intrinsic = self.cur.acceptn(Tok::At);
        if lhs.is_none() {
            if !self.cur.accept_data() {
                return Err(self.expected("a primary expression"));
            }
            lhs = Some(self.parse_simple()?);
        }
        let mut lhs = lhs.unwrap();

        loop {
            match self.cur.peek_tok() {
                Tok::LBrack => {
                    if is_intrinsic {
                        return Err(self.err_here(
                            "only function calls can be intrinsic; attempted subscript here",
                        ));
                    }
                    self.cur.retag(Tok::Subs);
                    let oper = self.cur.peek().clone();
                    self.cur.next();
                    let rhs = self.parse_expr_16(false)?;
                    if !self.cur.acceptn(Tok::RBrack) {
                        return Err(self.expected("closing bracket ']' for subscript expression"));
                    }
                    lhs = self.mk_expr(oper.loc, lhs, oper, Some(rhs), false);
                }
                Tok::LParen => {
                    lhs = self.parse_call(lhs, true, is_intrinsic)?;
                }
                Tok::LBrace if !disable_brace => {
                    lhs = self.parse_call(lhs, false, is_intrinsic)?;
                }
                Tok::Dot | Tok::Arrow => {
                    let dot = self.cur.peek().clone();
                    self.cur.next();
                    let rhs = self.parse_simple()?;
                    lhs = self.mk_expr(dot.loc, lhs, dot, Some(rhs), false);
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    /// `(args...)` function call or `{args...}` struct instantiation.
    fn parse_call(&mut self, lhs: StmtId, fncall: bool, is_intrinsic: bool) -> SemResult<StmtId> {
        self.cur.retag(if fncall { Tok::FnCall } else { Tok::StCall });
        let oper = self.cur.peek().clone();
        self.cur.next();
        let closer = if fncall { Tok::RParen } else { Tok::RBrace };
        let mut args = Vec::new();
        if !self.cur.acceptn(closer) {
            loop {
                args.push(self.parse_expr_16(false)?);
                if !self.cur.acceptn(Tok::Comma) {
                    break;
                }
            }
            if !self.cur.acceptn(closer) {
                return Err(self.expected("closing parenthesis/brace after call arguments"));
            }
        }
        let info = self.alloc(oper.loc, StmtKind::CallInfo { args });
        Ok(self.mk_expr(oper.loc, lhs, oper, Some(info), is_intrinsic))
    }

    // ------------------------------------------------------------------
    // declarations
    // ------------------------------------------------------------------

    fn parse_var(&mut self, in_ty: Occurs, otype: Occurs, oval: Occurs) -> SemResult<StmtId> {
        let mut comptime = false;
        let mut global = false;
        while self.cur.accept2(Tok::Comptime, Tok::Global) {
            if self.cur.acceptn(Tok::Comptime) {
                comptime = true;
            }
            if self.cur.acceptn(Tok::Global) {
                global = true;
            }
        }

        if !self.cur.accept(Tok::Iden) {
            return Err(self.expected("identifier for variable name"));
        }
        let name = self.cur.peek().clone();
        self.cur.next();

        let mut inty: Option<StmtId> = None;
        let mut vtype: Option<StmtId> = None;
        let mut vval: Option<StmtId> = None;

        if self.cur.accept(Tok::In) {
            if in_ty == Occurs::No {
                return Err(self.err_here("unexpected 'in' here"));
            }
            if comptime {
                return Err(self.err_here("comptime can be used only for data variables"));
            }
            self.cur.next();
            inty = Some(self.parse_type()?);
        }

        if self.cur.accept(Tok::Col) {
            if otype == Occurs::No {
                return Err(self.err_here("unexpected beginning of type here"));
            }
            self.cur.next();
            let ty = self.parse_type()?;
            let meta = matches!(
                &self.cx.stmts.get(ty).kind,
                StmtKind::Type { expr, .. }
                    if matches!(&self.cx.stmts.get(*expr).kind, StmtKind::Simple { lex, .. } if lex.tok == Tok::Type)
            );
            if meta && !comptime {
                return Err(self.err_here("a variable of type 'type' must be comptime"));
            }
            vtype = Some(ty);
        }

        if self.cur.accept(Tok::Assn) {
            if oval == Occurs::No {
                return Err(self.err_here("unexpected beginning of value assignment here"));
            }
            self.cur.next();
            if comptime
                && matches!(self.cur.peek_tok(), Tok::Enum | Tok::Struct | Tok::Fn | Tok::Extern)
            {
                return Err(self.err_here("comptime declaration can only have an expression as value"));
            }
            vval = Some(match self.cur.peek_tok() {
                Tok::Enum => self.parse_enum()?,
                Tok::Struct => self.parse_struct(true)?,
                Tok::Fn => self.parse_fndef()?,
                Tok::Extern => {
                    let ext = self.parse_extern()?;
                    let no_entity = matches!(
                        &self.cx.stmts.get(ext).kind,
                        StmtKind::Extern { entity: None, .. }
                    );
                    if no_entity && vtype.is_none() {
                        return Err(self.err_here("variable extern must have a type"));
                    }
                    ext
                }
                _ => self.parse_expr_16(false)?,
            });
        }

        if vtype.is_none() && vval.is_none() {
            return Err(self
                .cx
                .err_loc(name.loc, "invalid variable declaration - no type or value set"));
        }
        if comptime && vval.is_none() && oval != Occurs::No {
            return Err(self
                .cx
                .err_loc(name.loc, "comptime variable cannot be declared without an expression"));
        }

        if let Some(inty) = inty {
            if vtype.is_some() {
                return Err(self.cx.err_loc(
                    name.loc,
                    "let-in statements can only have values (function definitions) - no types allowed",
                ));
            }
            let is_fndef = vval.is_some_and(|v| self.cx.stmts.get(v).is_fndef());
            if !is_fndef {
                return Err(self
                    .cx
                    .err_loc(name.loc, "only functions can be created using let-in statements"));
            }
            // `let n in Ty = fn(...)` injects `self: &Ty` as first parameter
            let in_loc = self.cx.stmts.loc(inty);
            self.cx.stmts.get_mut(inty).mask |= StmtMask::REF;
            let self_lex = Lexeme::with_str(in_loc, Tok::Iden, "self");
            let self_var = self.alloc(
                in_loc,
                StmtKind::Var {
                    name: self_lex,
                    vtype: Some(inty),
                    vval: None,
                    applied_module_id: false,
                },
            );
            let fndef = vval.unwrap();
            if let StmtKind::FnDef { sig, .. } = self.cx.stmts.get(fndef).kind
                && let StmtKind::FnSig { args, .. } = &mut self.cx.stmts.get_mut(sig).kind
            {
                args.insert(0, self_var);
            }
        }

        let var = self.alloc(
            name.loc,
            StmtKind::Var {
                name,
                vtype,
                vval,
                applied_module_id: false,
            },
        );
        let mut mask = StmtMask::empty();
        if inty.is_some() {
            mask |= StmtMask::IN;
        }
        if comptime {
            mask |= StmtMask::COMPTIME;
        }
        if global {
            mask |= StmtMask::GLOBAL;
        }
        self.cx.stmts.get_mut(var).mask = mask;
        Ok(var)
    }

    fn parse_fnsig(&mut self) -> SemResult<StmtId> {
        let start = self.cur.loc();
        if !self.cur.acceptn(Tok::Fn) {
            return Err(self.expected("'fn' here"));
        }
        if !self.cur.acceptn(Tok::LParen) {
            return Err(self.expected("opening parenthesis for function args"));
        }

        let mut args: Vec<StmtId> = Vec::new();
        let mut argnames: AHashSet<String> = AHashSet::new();
        let mut found_va = false;
        if !self.cur.acceptn(Tok::RParen) {
            loop {
                let var = self.parse_var(Occurs::No, Occurs::Yes, Occurs::No)?;
                let (vname, is_va) = match &self.cx.stmts.get(var).kind {
                    StmtKind::Var { name, vtype, .. } => {
                        let va = vtype.is_some_and(|t| {
                            matches!(self.cx.stmts.get(t).kind, StmtKind::Type { variadic: true, .. })
                        });
                        (name.str_data().to_owned(), va)
                    }
                    _ => unreachable!("parse_var yields a var"),
                };
                if !argnames.insert(vname) {
                    return Err(self.err_here(
                        "this argument name is already used before in this function signature",
                    ));
                }
                if is_va {
                    found_va = true;
                }
                args.push(var);
                if !self.cur.acceptn(Tok::Comma) {
                    break;
                }
                if found_va {
                    return Err(self.err_here("no parameter can exist after variadic"));
                }
            }
            if !self.cur.acceptn(Tok::RParen) {
                return Err(self.expected("closing parenthesis after function args"));
            }
        }

        let ret = if self.cur.acceptn(Tok::Col) {
            self.parse_type()?
        } else {
            let loc = self.cur.prev().loc;
            let void_sim = self.alloc(
                loc,
                StmtKind::Simple {
                    lex: Lexeme::new(loc, Tok::Void),
                    decl: None,
                    self_of: None,
                    applied_module_id: false,
                },
            );
            self.alloc(
                loc,
                StmtKind::Type {
                    ptr: 0,
                    variadic: false,
                    expr: void_sim,
                },
            )
        };

        Ok(self.alloc(
            start,
            StmtKind::FnSig {
                args,
                ret,
                templates_disabled: false,
                has_variadic: found_va,
            },
        ))
    }

    fn parse_fndef(&mut self) -> SemResult<StmtId> {
        let start = self.cur.loc();
        let sig = self.parse_fnsig()?;
        self.defers.push_func();
        let blk = self.parse_block(true);
        self.defers.pop_func();
        Ok(self.alloc(
            start,
            StmtKind::FnDef {
                sig,
                blk: Some(blk?),
                parent_var: None,
                used: 0,
            },
        ))
    }

    fn parse_header(&mut self) -> SemResult<StmtId> {
        if !self.cur.accept2(Tok::Iden, Tok::Str) {
            return Err(self.expected("string or identifier for the name of header"));
        }
        let names = self.cur.peek().clone();
        self.cur.next();
        let mut flags = None;
        if self.cur.acceptn(Tok::Col) {
            if !self.cur.accept2(Tok::Iden, Tok::Str) {
                return Err(self.expected("string or identifier for the header flags"));
            }
            flags = Some(self.cur.peek().clone());
            self.cur.next();
        }
        Ok(self.alloc(names.loc, StmtKind::Header { names, flags }))
    }

    fn parse_lib(&mut self) -> SemResult<StmtId> {
        if !self.cur.accept2(Tok::Iden, Tok::Str) {
            return Err(self.expected("string or identifier for the lib flags"));
        }
        let flags = self.cur.peek().clone();
        self.cur.next();
        Ok(self.alloc(flags.loc, StmtKind::Lib { flags }))
    }

    fn parse_extern(&mut self) -> SemResult<StmtId> {
        if !self.cur.acceptn(Tok::Extern) {
            return Err(self.expected("'extern' keyword here"));
        }
        if !self.cur.acceptn(Tok::LBrack) {
            return Err(self.expected("opening bracket for extern information"));
        }
        let struct_kw = self.cur.acceptn(Tok::Struct);
        if !self.cur.accept(Tok::Iden) {
            return Err(self.expected("identifier for extern name"));
        }
        let mut name = self.cur.peek().clone();
        self.cur.next();
        if struct_kw {
            // C requires the tag keyword on struct type names
            let data = format!("struct {}", name.str_data());
            name.set_str_data(data);
        }

        let mut headers = None;
        let mut libs = None;
        if self.cur.acceptn(Tok::Comma) {
            headers = Some(self.parse_header()?);
            if self.cur.acceptn(Tok::Comma) {
                libs = Some(self.parse_lib()?);
            }
        }
        if !self.cur.acceptn(Tok::RBrack) {
            return Err(self.expected("closing bracket after extern information"));
        }

        let entity = match self.cur.peek_tok() {
            Tok::Fn => Some(self.parse_fnsig()?),
            Tok::Struct => Some(self.parse_struct(false)?),
            _ => None,
        };
        Ok(self.alloc(
            name.loc,
            StmtKind::Extern {
                name,
                headers,
                libs,
                entity,
                parent_var: None,
            },
        ))
    }

    fn parse_enum(&mut self) -> SemResult<StmtId> {
        let start = self.cur.loc();
        if !self.cur.acceptn(Tok::Enum) {
            return Err(self.expected("'enum' keyword here"));
        }
        if !self.cur.acceptn(Tok::LBrace) {
            return Err(self.expected("opening brace for enum list"));
        }
        let mut items = Vec::new();
        while self.cur.accept(Tok::Iden) {
            items.push(self.cur.peek().clone());
            self.cur.next();
            if !self.cur.acceptn(Tok::Comma) {
                break;
            }
        }
        if !self.cur.acceptn(Tok::RBrace) {
            return Err(self.expected("closing brace for enum list"));
        }
        if items.is_empty() {
            return Err(self.cx.err_loc(start, "cannot have empty enumeration"));
        }
        Ok(self.alloc(start, StmtKind::Enum { items }))
    }

    fn parse_struct(&mut self, allowed_templates: bool) -> SemResult<StmtId> {
        let start = self.cur.loc();
        if !self.cur.acceptn(Tok::Struct) {
            return Err(self.expected("'struct' keyword here"));
        }

        let mut templates = Vec::new();
        if self.cur.acceptn(Tok::Lt) {
            if !allowed_templates {
                return Err(self.err_here("templates are not allowed in externed structs"));
            }
            while self.cur.accept(Tok::Iden) {
                templates.push(self.cur.peek().clone());
                self.cur.next();
                if !self.cur.acceptn(Tok::Comma) {
                    break;
                }
            }
            if !self.cur.acceptn(Tok::Gt) {
                return Err(self.expected("'>' for end of struct template list"));
            }
        }

        if !self.cur.acceptn(Tok::LBrace) {
            return Err(self.expected("opening brace for struct definition"));
        }
        let mut fields = Vec::new();
        let mut fieldnames: AHashSet<String> = AHashSet::new();
        while self.cur.accept2(Tok::Iden, Tok::Comptime) {
            let field = self.parse_var(Occurs::No, Occurs::Yes, Occurs::No)?;
            let fname = match &self.cx.stmts.get(field).kind {
                StmtKind::Var { name, .. } => name.str_data().to_owned(),
                _ => unreachable!("parse_var yields a var"),
            };
            if !fieldnames.insert(fname) {
                return Err(
                    self.err_here("this field name is already used before in this same structure")
                );
            }
            fields.push(field);
            if !self.cur.acceptn(Tok::ColS) {
                break;
            }
        }
        if !self.cur.acceptn(Tok::RBrace) {
            return Err(self.expected("closing brace for struct declaration/definition"));
        }
        Ok(self.alloc(
            start,
            StmtKind::Struct {
                fields,
                templates,
                externed: false,
            },
        ))
    }

    fn parse_vardecl(&mut self) -> SemResult<StmtId> {
        let start = self.cur.loc();
        if !self.cur.acceptn(Tok::Let) {
            return Err(self.expected("'let' keyword here"));
        }
        let mut decls = Vec::new();
        while matches!(self.cur.peek_tok(), Tok::Iden | Tok::Comptime | Tok::Global) {
            // comptime/global variables allow no member (`in`) component
            let restricted = matches!(self.cur.peek_tok(), Tok::Comptime | Tok::Global);
            let comptime = self.cur.peek_tok() == Tok::Comptime;
            let in_occurs = if restricted { Occurs::No } else { Occurs::Maybe };
            let val_occurs = if comptime { Occurs::Yes } else { Occurs::Maybe };
            decls.push(self.parse_var(in_occurs, Occurs::Maybe, val_occurs)?);
            if !self.cur.acceptn(Tok::Comma) {
                break;
            }
        }
        Ok(self.alloc(start, StmtKind::VarDecl { decls }))
    }

    // ------------------------------------------------------------------
    // control flow
    // ------------------------------------------------------------------

    fn parse_conds(&mut self, is_inline: bool) -> SemResult<StmtId> {
        if self.cur.accept(Tok::Inline) {
            self.cur.next();
        }
        let start = self.cur.loc();
        let mut conds: Vec<Conditional> = Vec::new();

        if !self.cur.acceptn(Tok::If) {
            return Err(self.expected("'if' here"));
        }
        loop {
            let cond = self.parse_expr_15(true)?;
            let blk = self.parse_block(true)?;
            conds.push(Conditional { cond: Some(cond), blk });

            if self.cur.acceptn(Tok::Elif) {
                continue;
            }
            if self.cur.acceptn(Tok::Else) {
                if self.cur.acceptn(Tok::If) {
                    continue;
                }
                let blk = self.parse_block(true)?;
                conds.push(Conditional { cond: None, blk });
            }
            break;
        }
        Ok(self.alloc(start, StmtKind::Cond { conds, is_inline }))
    }

    /// `for it in expr { body }` desugars into the iterator protocol:
    ///
    /// ```text
    /// {
    ///     let __it_interm = expr;
    ///     for let __it_iter = __it_interm.begin();
    ///         __it_iter != __it_interm.end();
    ///         __it_iter = __it_interm.next(__it_iter)
    ///     {
    ///         let it = __it_interm.at(__it_iter);
    ///         body
    ///     }
    /// }
    /// ```
    fn parse_forin(&mut self) -> SemResult<StmtId> {
        let start = self.cur.loc();
        if !self.cur.acceptn(Tok::For) {
            return Err(self.expected("'for' here"));
        }
        if !self.cur.accept(Tok::Iden) {
            return Err(self.expected("iterator (identifier) here"));
        }
        let iter = self.cur.peek().clone();
        self.cur.next();
        if !self.cur.acceptn(Tok::In) {
            return Err(self.expected("'in' here"));
        }
        let in_expr = self.parse_expr_01(true)?;
        if !self.cur.accept(Tok::LBrace) {
            return Err(self.expected("block for for-in construct"));
        }
        let body = self.parse_block(true)?;

        let loc = start;
        let user = iter.str_data();
        let interm_name = format!("__{user}_interm");
        let iter_name = format!("__{user}_iter");

        // let __it_interm = expr;
        let interm_var = self.mk_named_var(loc, &interm_name, in_expr);
        let interm_decl = self.alloc(loc, StmtKind::VarDecl { decls: vec![interm_var] });

        // let __it_iter = __it_interm.begin();
        let begin_call = self.mk_member_call(loc, &interm_name, "begin", vec![]);
        let iter_var = self.mk_named_var(loc, &iter_name, begin_call);
        let init = self.alloc(loc, StmtKind::VarDecl { decls: vec![iter_var] });

        // __it_iter != __it_interm.end()
        let end_call = self.mk_member_call(loc, &interm_name, "end", vec![]);
        let iter_ref = self.mk_iden(loc, &iter_name);
        let cond = self.mk_expr(loc, iter_ref, Lexeme::new(loc, Tok::Ne), Some(end_call), false);

        // __it_iter = __it_interm.next(__it_iter)
        let iter_arg = self.mk_iden(loc, &iter_name);
        let next_call = self.mk_member_call(loc, &interm_name, "next", vec![iter_arg]);
        let iter_dst = self.mk_iden(loc, &iter_name);
        let incr = self.mk_expr(loc, iter_dst, Lexeme::new(loc, Tok::Assn), Some(next_call), false);

        // let it = __it_interm.at(__it_iter); prepended to the body
        let iter_at = self.mk_iden(loc, &iter_name);
        let at_call = self.mk_member_call(loc, &interm_name, "at", vec![iter_at]);
        let user_var = self.mk_named_var(iter.loc, user, at_call);
        let user_decl = self.alloc(iter.loc, StmtKind::VarDecl { decls: vec![user_var] });
        if let StmtKind::Block { stmts, .. } = &mut self.cx.stmts.get_mut(body).kind {
            stmts.insert(0, user_decl);
        }

        let for_stmt = self.alloc(
            loc,
            StmtKind::For {
                init: Some(init),
                cond: Some(cond),
                incr: Some(incr),
                blk: body,
                is_inline: false,
            },
        );
        Ok(self.alloc(
            loc,
            StmtKind::Block {
                stmts: vec![interm_decl, for_stmt],
                is_top: false,
                layering_disabled: false,
            },
        ))
    }

    fn mk_iden(&mut self, loc: ModuleLoc, name: &str) -> StmtId {
        self.alloc(
            loc,
            StmtKind::Simple {
                lex: Lexeme::with_str(loc, Tok::Iden, name),
                decl: None,
                self_of: None,
                applied_module_id: false,
            },
        )
    }

    fn mk_named_var(&mut self, loc: ModuleLoc, name: &str, vval: StmtId) -> StmtId {
        self.alloc(
            loc,
            StmtKind::Var {
                name: Lexeme::with_str(loc, Tok::Iden, name),
                vtype: None,
                vval: Some(vval),
                applied_module_id: false,
            },
        )
    }

    fn mk_member_call(&mut self, loc: ModuleLoc, base: &str, member: &str, args: Vec<StmtId>) -> StmtId {
        let base_sim = self.mk_iden(loc, base);
        let member_sim = self.mk_iden(loc, member);
        let access = self.mk_expr(loc, base_sim, Lexeme::new(loc, Tok::Dot), Some(member_sim), false);
        let info = self.alloc(loc, StmtKind::CallInfo { args });
        self.mk_expr(loc, access, Lexeme::new(loc, Tok::FnCall), Some(info), false)
    }

    fn parse_for(&mut self, is_inline: bool) -> SemResult<StmtId> {
        let start = self.cur.loc();
        if !self.cur.acceptn(Tok::For) {
            return Err(self.expected("'for' here"));
        }

        let mut init = None;
        let mut cond = None;
        let mut incr = None;

        if !self.cur.acceptn(Tok::ColS) {
            init = Some(if self.cur.accept(Tok::Let) {
                self.parse_vardecl()?
            } else {
                self.parse_expr(false)?
            });
            if !self.cur.acceptn(Tok::ColS) {
                return Err(self.expected("semicolon here"));
            }
        }
        if !self.cur.acceptn(Tok::ColS) {
            cond = Some(self.parse_expr_16(false)?);
            if !self.cur.acceptn(Tok::ColS) {
                return Err(self.expected("semicolon here"));
            }
        }
        if !self.cur.accept(Tok::LBrace) {
            incr = Some(self.parse_expr(true)?);
            if !self.cur.accept(Tok::LBrace) {
                return Err(self.expected("braces for body here"));
            }
        }
        let blk = self.parse_block(true)?;
        Ok(self.alloc(
            start,
            StmtKind::For {
                init,
                cond,
                incr,
                blk,
                is_inline,
            },
        ))
    }

    /// `while cond { .. }` is plain `for ; cond ; { .. }`.
    fn parse_while(&mut self) -> SemResult<StmtId> {
        let start = self.cur.loc();
        if !self.cur.acceptn(Tok::While) {
            return Err(self.expected("'while' here"));
        }
        let cond = self.parse_expr_16(true)?;
        let blk = self.parse_block(true)?;
        Ok(self.alloc(
            start,
            StmtKind::For {
                init: None,
                cond: Some(cond),
                incr: None,
                blk,
                is_inline: false,
            },
        ))
    }

    fn parse_ret(&mut self) -> SemResult<StmtId> {
        let start = self.cur.loc();
        if !self.cur.acceptn(Tok::Return) {
            return Err(self.expected("'return' here"));
        }
        let val = if self.cur.accept(Tok::ColS) {
            None
        } else {
            Some(self.parse_expr_16(false)?)
        };
        Ok(self.alloc(start, StmtKind::Ret { val, fn_blk: None }))
    }

    fn parse_continue(&mut self) -> SemResult<StmtId> {
        let start = self.cur.loc();
        if !self.cur.acceptn(Tok::Continue) {
            return Err(self.expected("'continue' here"));
        }
        Ok(self.alloc(start, StmtKind::Continue))
    }

    fn parse_break(&mut self) -> SemResult<StmtId> {
        let start = self.cur.loc();
        if !self.cur.acceptn(Tok::Break) {
            return Err(self.expected("'break' here"));
        }
        Ok(self.alloc(start, StmtKind::Break))
    }

    /// `defer expr;` registers the expression in the innermost frame; no
    /// statement reaches the tree here.
    fn parse_defer(&mut self) -> SemResult<()> {
        let start = self.cur.loc();
        if !self.cur.acceptn(Tok::Defer) {
            return Err(self.expected("'defer' here"));
        }
        let val = self.parse_expr_16(false)?;
        if !self.defers.add(val) {
            return Err(self.cx.err_loc(start, "defer is not allowed here"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{context::Context, dump, lex::Lexer};

    fn parse_src(src: &str) -> (Context, StmtId) {
        let mut cx = Context::for_tests();
        let module = cx.srcmap.add("test.sc", src);
        let mut toks = Vec::new();
        let ok = Lexer::new(&mut cx, module).tokenize(src, &mut toks);
        assert!(ok, "lex failed: {}", cx.diags.render(&cx.srcmap));
        let tree = parse(&mut cx, module, toks, src.len());
        let tree = match tree {
            Ok(t) => t,
            Err(_) => panic!("parse failed: {}", cx.diags.render(&cx.srcmap)),
        };
        (cx, tree)
    }

    fn parse_err(src: &str) -> String {
        let mut cx = Context::for_tests();
        let module = cx.srcmap.add("test.sc", src);
        let mut toks = Vec::new();
        assert!(Lexer::new(&mut cx, module).tokenize(src, &mut toks));
        assert!(parse(&mut cx, module, toks, src.len()).is_err(), "expected parse failure");
        cx.diags.render(&cx.srcmap)
    }

    fn dump_of(src: &str) -> String {
        let (cx, tree) = parse_src(src);
        dump::dump_tree(&cx, tree)
    }

    #[test]
    fn precedence_nests_muliplication_below_addition() {
        let d = dump_of("let r = 1 + 2 * 3;");
        // the `+` must sit above the `*` in the tree
        let add = d.find("[oper = +]").expect("has +");
        let mul = d.find("[oper = *]").expect("has *");
        assert!(add < mul, "got:\n{d}");
    }

    #[test]
    fn unary_minus_folds_into_literals() {
        let d = dump_of("let r = -5; let f = -2.5;");
        assert!(d.contains("INT -5"), "got:\n{d}");
        assert!(d.contains("FLT -2.5"), "got:\n{d}");
        assert!(!d.contains("[oper = u-]"), "got:\n{d}");
    }

    #[test]
    fn while_desugars_to_for() {
        let d = dump_of("while 1 { break; }");
        assert!(d.contains("For [inline = false]"), "got:\n{d}");
        assert!(d.contains("Cond:"), "got:\n{d}");
        assert!(!d.contains("Init:"), "got:\n{d}");
    }

    #[test]
    fn for_in_desugars_to_iterator_protocol() {
        let d = dump_of("for it in xs { continue; }");
        assert!(d.contains("__it_interm"), "got:\n{d}");
        assert!(d.contains("__it_iter"), "got:\n{d}");
        for member in ["begin", "end", "next", "at"] {
            assert!(d.contains(member), "missing {member} in:\n{d}");
        }
        // the user's name binds inside the loop body
        assert!(d.contains("Variable: it"), "got:\n{d}");
    }

    #[test]
    fn defer_never_survives_and_hoists_in_order() {
        let d = dump_of(
            "let f = fn(): i32 { let x = 0; defer x = 1; { defer x = 2; } defer x = 3; return 0; };",
        );
        assert!(!d.contains("Defer"), "defer node leaked:\n{d}");
        // block-scoped defer runs at block end; function defers hoist
        // before the return in reverse registration order: 2, then 3, 1
        let p2 = d.find("INT 2").expect("defer 2 present");
        let p3 = d.find("INT 3").expect("defer 3 present");
        let p1 = d.rfind("INT 1").expect("defer 1 present");
        let ret = d.find("Return:").expect("return present");
        assert!(p2 < p3 && p3 < p1 && p1 < ret, "got:\n{d}");
    }

    #[test]
    fn defer_at_block_end_only_runs_own_frame() {
        let d = dump_of("let f = fn() { defer x = 9; let y = 0; };");
        // no return: the defer lands at the end of the function block
        let y = d.find("Variable: y").expect("y present");
        let nine = d.find("INT 9").expect("deferred statement present");
        assert!(y < nine, "got:\n{d}");
    }

    #[test]
    fn attributes_attach_to_next_statement() {
        let (cx, tree) = parse_src("#[opaque, target=c] let x = 1;");
        let StmtKind::Block { stmts, .. } = &cx.stmts.get(tree).kind else {
            panic!("no top block");
        };
        let attrs = cx.stmts.get(stmts[0]).attrs.as_ref().expect("attrs attached");
        assert_eq!(attrs.get("opaque").map(String::as_str), Some(""));
        assert_eq!(attrs.get("target").map(String::as_str), Some("c"));
    }

    #[test]
    fn let_in_injects_self_parameter() {
        let d = dump_of("let area in Rect = fn(): i32 { return 0; };");
        assert!(d.contains("Variable: self"), "got:\n{d}");
    }

    #[test]
    fn variadic_tail_only() {
        let msg = parse_err("let f = fn(xs: ...any, y: i32) {};");
        assert!(msg.contains("no parameter can exist after variadic"), "got: {msg}");
    }

    #[test]
    fn missing_semicolon_is_reported() {
        let msg = parse_err("let x = 1 let y = 2;");
        assert!(msg.contains("expected semicolon"), "got: {msg}");
    }

    #[test]
    fn ternary_parses() {
        let d = dump_of("let r = 1 ? 2 : 3;");
        assert!(d.contains("[oper = ?]"), "got:\n{d}");
        assert!(d.contains("[oper = :]"), "got:\n{d}");
    }

    #[test]
    fn stable_dump_across_runs() {
        let src = "let a = 1; let f = fn(x: i32): i32 { return x; };";
        assert_eq!(dump_of(src), dump_of(src));
    }
}
