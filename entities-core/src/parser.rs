//! Recursive-descent grammar for entities text.
//!
//! Four mutually recursive productions, selected by nesting level:
//!
//! ```text
//! file       := ( comment | ident '{' entity '}' | ident value | value )*
//! entity     := ( comment | ident ident '{' definition '}'
//!                         | ident '{' layer '}'
//!                         | ident '=' value ';'? )*
//! layer      := ( comment | string )*
//! definition := ( comment | ident '=' ( '{' definition '}' | value ';'? ) )*
//! ```
//!
//! A production stops at the first token it has no rule for and hands that
//! token back to its caller, which must accept it (`}` for a nested body,
//! end of input at the top). Nodes are allocated into the tree as they are
//! completed; when a parse fails every node built so far is freed before the
//! error is returned.

use std::fmt;

use tracing::debug;

use crate::error::ParseError;
use crate::node::{NodeFlags, NodeId, NodeKind};
use crate::token::{Token, TokenKind, Tokenizer};
use crate::tree::Tree;

/// Which production is parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrammarContext {
    File,
    Entity,
    Layer,
    Definition,
}

impl fmt::Display for GrammarContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GrammarContext::File => "file",
            GrammarContext::Entity => "entity",
            GrammarContext::Layer => "layer",
            GrammarContext::Definition => "definition",
        };
        f.write_str(s)
    }
}

/// Parse a whole document into `tree`'s root, which must be empty.
pub fn parse_document(tree: &mut Tree, input: &[u8]) -> Result<(), ParseError> {
    debug_assert_eq!(tree.child_count(tree.root_id()), 0);
    let children = parse_fragment(tree, GrammarContext::File, input, 0, false)?;
    let root = tree.root_id();
    tree.set_children(root, &children);
    let last = input.iter().rposition(|&b| b != b' ' && b != b'\t');
    if last.is_some_and(|i| input[i] != b'\n') {
        tree.insert_flags(root, NodeFlags::NO_FINAL_NEWLINE);
    }
    debug!(bytes = input.len(), nodes = tree.subtree_len(root), "parsed document");
    Ok(())
}

/// Parse `input` as the children of a node whose body uses `context`.
///
/// The returned nodes are detached: their own subtrees are complete but
/// their parent is unset until they are spliced in. `depth` is the nesting
/// depth of that node (0 for the root) and counts against the tree's depth
/// limit. With `first_inline`, a node starting on the first line is flagged
/// to continue the line of whatever precedes it.
pub(crate) fn parse_fragment(
    tree: &mut Tree,
    context: GrammarContext,
    input: &[u8],
    depth: usize,
    first_inline: bool,
) -> Result<Vec<NodeId>, ParseError> {
    let mut parser = Parser {
        tree,
        input,
        tokens: Tokenizer::new(input),
        peeked: None,
        prev_line: if first_inline { 1 } else { 0 },
        depth,
    };
    let children = parser.production(context)?;
    match parser.peek() {
        Ok(tok) if tok.kind == TokenKind::End => Ok(children),
        result => {
            let err = match result {
                Ok(tok) => parser.unexpected(context, tok),
                Err(e) => e,
            };
            for child in children {
                parser.tree.free_subtree(child);
            }
            Err(err)
        }
    }
}

struct Parser<'t, 'a> {
    tree: &'t mut Tree,
    input: &'a [u8],
    tokens: Tokenizer<'a>,
    peeked: Option<Token>,
    /// Line of the last consumed token, 0 before the first
    prev_line: usize,
    depth: usize,
}

impl<'t, 'a> Parser<'t, 'a> {
    fn peek(&mut self) -> Result<Token, ParseError> {
        match self.peeked {
            Some(tok) => Ok(tok),
            None => {
                let tok = self.tokens.next_token()?;
                self.peeked = Some(tok);
                Ok(tok)
            }
        }
    }

    fn bump(&mut self) -> Result<Token, ParseError> {
        let tok = self.peek()?;
        self.peeked = None;
        self.prev_line = tok.line;
        Ok(tok)
    }

    fn expect(&mut self, context: GrammarContext, kind: TokenKind) -> Result<Token, ParseError> {
        let tok = self.peek()?;
        if tok.kind != kind {
            return Err(self.unexpected(context, tok));
        }
        self.bump()
    }

    fn unexpected(&self, context: GrammarContext, tok: Token) -> ParseError {
        let message = match tok.kind {
            TokenKind::End => format!("unexpected {} in {}", tok.kind, context),
            _ => format!(
                "unexpected {} '{}' in {}",
                tok.kind,
                String::from_utf8_lossy(tok.text(self.input)),
                context
            ),
        };
        ParseError::grammar(context, tok.line, message)
    }

    /// Flags for a node whose first token is `tok`.
    fn start_flags(&self, tok: Token) -> NodeFlags {
        if tok.line == self.prev_line {
            NodeFlags::NO_INDENT
        } else {
            NodeFlags::empty()
        }
    }

    /// Run one production, freeing its partial children on failure.
    fn production(&mut self, context: GrammarContext) -> Result<Vec<NodeId>, ParseError> {
        if self.depth >= self.tree.max_depth() {
            let line = self.tokens.line();
            return Err(ParseError::grammar(context, line, "nesting too deep"));
        }
        self.depth += 1;
        let mut children = Vec::new();
        let result = match context {
            GrammarContext::File => self.file_entries(&mut children),
            GrammarContext::Entity => self.entity_entries(&mut children),
            GrammarContext::Layer => self.layer_entries(&mut children),
            GrammarContext::Definition => self.definition_entries(&mut children),
        };
        self.depth -= 1;

        match result {
            Ok(()) => Ok(children),
            Err(e) => {
                for child in children {
                    self.tree.free_subtree(child);
                }
                Err(e)
            }
        }
    }

    /// Parse `'{' body '}'` after a header and build the object node.
    fn object(
        &mut self,
        outer: GrammarContext,
        inner: GrammarContext,
        kind: NodeKind,
        flags: NodeFlags,
        name: &[u8],
    ) -> Result<NodeId, ParseError> {
        self.expect(outer, TokenKind::BraceOpen)?;
        let children = self.production(inner)?;
        let body_end = self.prev_line;
        let close = match self.expect(inner, TokenKind::BraceClose) {
            Ok(close) => close,
            Err(e) => {
                for child in children {
                    self.tree.free_subtree(child);
                }
                return Err(e);
            }
        };
        let mut flags = flags | NodeFlags::HAS_BRACES;
        if close.line == body_end {
            flags |= NodeFlags::CLOSE_INLINE;
        }
        let node = self.tree.alloc_node(kind, flags, name, b"");
        self.tree.set_children(node, &children);
        Ok(node)
    }

    /// Parse a value and an optional `;` after `name =`.
    fn assigned_leaf(&mut self, context: GrammarContext, flags: NodeFlags, name: &[u8]) -> Result<NodeId, ParseError> {
        let tok = self.peek()?;
        if !tok.kind.is_value() {
            return Err(self.unexpected(context, tok));
        }
        self.bump()?;
        let mut flags = flags | NodeFlags::HAS_EQUALS;
        if self.peek()?.kind == TokenKind::Terminal {
            self.bump()?;
            flags |= NodeFlags::HAS_SEMICOLON;
        }
        Ok(self.tree.alloc_node(NodeKind::Leaf, flags, name, tok.text(self.input)))
    }

    fn comment(&mut self, tok: Token) -> Result<NodeId, ParseError> {
        let flags = self.start_flags(tok);
        self.bump()?;
        Ok(self.tree.alloc_node(NodeKind::Comment, flags, b"", tok.text(self.input)))
    }

    fn file_entries(&mut self, out: &mut Vec<NodeId>) -> Result<(), ParseError> {
        const CX: GrammarContext = GrammarContext::File;
        loop {
            let tok = self.peek()?;
            let node = match tok.kind {
                TokenKind::Comment => self.comment(tok)?,
                TokenKind::Identifier => {
                    let flags = self.start_flags(tok);
                    self.bump()?;
                    let name = tok.text(self.input);
                    let next = self.peek()?;
                    match next.kind {
                        TokenKind::BraceOpen => self.object(CX, GrammarContext::Entity, NodeKind::Entity, flags, name)?,
                        k if k.is_value() => {
                            self.bump()?;
                            self.tree.alloc_node(NodeKind::Leaf, flags, name, next.text(self.input))
                        }
                        _ => return Err(self.unexpected(CX, next)),
                    }
                }
                k if k.is_value() => {
                    let flags = self.start_flags(tok);
                    self.bump()?;
                    self.tree.alloc_node(NodeKind::Value, flags, b"", tok.text(self.input))
                }
                _ => return Ok(()),
            };
            out.push(node);
        }
    }

    fn entity_entries(&mut self, out: &mut Vec<NodeId>) -> Result<(), ParseError> {
        const CX: GrammarContext = GrammarContext::Entity;
        loop {
            let tok = self.peek()?;
            let node = match tok.kind {
                TokenKind::Comment => self.comment(tok)?,
                TokenKind::Identifier => {
                    let flags = self.start_flags(tok);
                    self.bump()?;
                    let name = tok.text(self.input);
                    let next = self.peek()?;
                    match next.kind {
                        TokenKind::Identifier => {
                            self.bump()?;
                            let mut full = Vec::with_capacity(name.len() + 1 + next.end - next.start);
                            full.extend_from_slice(name);
                            full.push(b' ');
                            full.extend_from_slice(next.text(self.input));
                            self.object(CX, GrammarContext::Definition, NodeKind::EntityDef, flags, &full)?
                        }
                        TokenKind::BraceOpen => self.object(CX, GrammarContext::Layer, NodeKind::Layer, flags, name)?,
                        TokenKind::Assignment => {
                            self.bump()?;
                            self.assigned_leaf(CX, flags, name)?
                        }
                        _ => return Err(self.unexpected(CX, next)),
                    }
                }
                _ => return Ok(()),
            };
            out.push(node);
        }
    }

    fn layer_entries(&mut self, out: &mut Vec<NodeId>) -> Result<(), ParseError> {
        loop {
            let tok = self.peek()?;
            let node = match tok.kind {
                TokenKind::Comment => self.comment(tok)?,
                TokenKind::ValueString => {
                    let flags = self.start_flags(tok);
                    self.bump()?;
                    self.tree.alloc_node(NodeKind::LayerString, flags, b"", tok.text(self.input))
                }
                _ => return Ok(()),
            };
            out.push(node);
        }
    }

    fn definition_entries(&mut self, out: &mut Vec<NodeId>) -> Result<(), ParseError> {
        const CX: GrammarContext = GrammarContext::Definition;
        loop {
            let tok = self.peek()?;
            let node = match tok.kind {
                TokenKind::Comment => self.comment(tok)?,
                TokenKind::Identifier => {
                    let flags = self.start_flags(tok);
                    self.bump()?;
                    let name = tok.text(self.input);
                    self.expect(CX, TokenKind::Assignment)?;
                    if self.peek()?.kind == TokenKind::BraceOpen {
                        self.object(CX, CX, NodeKind::Object, flags | NodeFlags::HAS_EQUALS, name)?
                    } else {
                        self.assigned_leaf(CX, flags, name)?
                    }
                }
                _ => return Ok(()),
            };
            out.push(node);
        }
    }
}
