/// SQL Parser - converts tokens into AST
use super::ast::*;
use super::token::{Token, TokenType};
use crate::backend::error::{BackendError, Result};

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

/// Tokenize and parse a (possibly multi-statement) SQL string.
pub fn parse_sql(sql: &str) -> Result<Vec<Statement>> {
    let tokens = super::lexer::Lexer::new(sql).tokenize()?;
    Parser::new(tokens).parse_statements()
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, position: 0 }
    }

    /// Parse every statement up to end of input. Empty statements are skipped.
    pub fn parse_statements(&mut self) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            while self.match_token(TokenType::Semicolon) {}
            if matches!(self.current().token_type, TokenType::Eof) {
                break;
            }
            statements.push(self.parse()?);
            if !matches!(self.current().token_type, TokenType::Eof | TokenType::Semicolon) {
                return Err(self.error("syntax error: expected end of statement"));
            }
        }
        Ok(statements)
    }

    /// Parse a single SQL statement
    pub fn parse(&mut self) -> Result<Statement> {
        let stmt = match &self.current().token_type {
            TokenType::Select => Statement::Select(self.parse_select()?),
            TokenType::Insert => Statement::Insert(self.parse_insert()?),
            TokenType::Update => Statement::Update(self.parse_update()?),
            TokenType::Delete => Statement::Delete(self.parse_delete()?),
            TokenType::Create => self.parse_create()?,
            TokenType::Drop => self.parse_drop()?,
            TokenType::Show => self.parse_show()?,
            TokenType::Set => self.parse_set()?,
            TokenType::Identifier(word) => match word.as_str() {
                "comment" => self.parse_comment()?,
                "notify" => self.parse_notify()?,
                "listen" => {
                    self.advance();
                    Statement::Listen { channel: self.parse_identifier()? }
                }
                "unlisten" => {
                    self.advance();
                    if self.match_token(TokenType::Star) {
                        Statement::Unlisten { channel: None }
                    } else {
                        Statement::Unlisten { channel: Some(self.parse_identifier()?) }
                    }
                }
                "begin" | "start" | "commit" | "end" | "rollback" | "abort" | "savepoint" | "release" => {
                    self.parse_transaction_control()?
                }
                _ => return Err(self.error(&format!("syntax error at or near \"{}\"", word))),
            },
            other => return Err(self.error(&format!("syntax error at or near {:?}", other))),
        };

        Ok(stmt)
    }

    fn parse_transaction_control(&mut self) -> Result<Statement> {
        let word = self.parse_identifier()?;
        let kind = match word.as_str() {
            "begin" | "start" => TransactionKind::Begin,
            "commit" | "end" => TransactionKind::Commit,
            "rollback" | "abort" => TransactionKind::Rollback,
            _ => TransactionKind::Savepoint,
        };
        // Remaining words (TRANSACTION, WORK, savepoint names) carry no meaning here
        self.skip_to_statement_end();
        Ok(Statement::TransactionControl(kind))
    }

    fn skip_to_statement_end(&mut self) {
        while !matches!(self.current().token_type, TokenType::Semicolon | TokenType::Eof) {
            self.advance();
        }
    }

    /// Parse SELECT statement
    fn parse_select(&mut self) -> Result<SelectStmt> {
        self.expect(TokenType::Select)?;

        let columns = self.parse_select_columns()?;

        let from = if self.match_token(TokenType::From) {
            let name = self.parse_identifier()?;
            let alias = self.parse_optional_alias()?;
            Some(TableRef { name, alias })
        } else {
            None
        };

        let where_clause = if self.match_token(TokenType::Where) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };

        let mut order_by = Vec::new();
        if self.match_token(TokenType::Order) {
            self.expect(TokenType::By)?;
            loop {
                let expr = self.parse_expr(0)?;
                let asc = if self.match_token(TokenType::Desc) {
                    false
                } else {
                    self.match_token(TokenType::Asc);
                    true
                };
                order_by.push(OrderByExpr { expr, asc });
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }

        let mut limit = None;
        let mut offset = None;
        loop {
            if self.match_token(TokenType::Limit) {
                if self.match_token(TokenType::All) {
                    limit = None;
                } else {
                    limit = Some(self.parse_u64()?);
                }
            } else if self.match_token(TokenType::Offset) {
                offset = Some(self.parse_u64()?);
            } else {
                break;
            }
        }

        Ok(SelectStmt {
            columns,
            from,
            where_clause,
            order_by,
            limit,
            offset,
        })
    }

    fn parse_optional_alias(&mut self) -> Result<Option<String>> {
        if self.match_token(TokenType::As) {
            return Ok(Some(self.parse_identifier()?));
        }
        if let TokenType::Identifier(name) = &self.current().token_type {
            let name = name.clone();
            self.advance();
            return Ok(Some(name));
        }
        Ok(None)
    }

    fn parse_select_columns(&mut self) -> Result<Vec<SelectColumn>> {
        let mut columns = Vec::new();

        loop {
            if self.match_token(TokenType::Star) {
                columns.push(SelectColumn::Star);
            } else {
                let expr = self.parse_expr(0)?;
                let alias = self.parse_optional_alias()?;
                columns.push(SelectColumn::Expr(expr, alias));
            }

            if !self.match_token(TokenType::Comma) {
                break;
            }
        }

        Ok(columns)
    }

    fn parse_returning(&mut self) -> Result<Option<Vec<SelectColumn>>> {
        if self.match_token(TokenType::Returning) {
            Ok(Some(self.parse_select_columns()?))
        } else {
            Ok(None)
        }
    }

    /// Parse INSERT statement
    fn parse_insert(&mut self) -> Result<InsertStmt> {
        self.expect(TokenType::Insert)?;
        self.expect(TokenType::Into)?;
        let table = self.parse_identifier()?;

        let columns = if self.match_token(TokenType::LParen) {
            let cols = self.parse_identifier_list()?;
            self.expect(TokenType::RParen)?;
            Some(cols)
        } else {
            None
        };

        self.expect(TokenType::Values)?;
        let mut values = Vec::new();
        loop {
            self.expect(TokenType::LParen)?;
            values.push(self.parse_expr_list()?);
            self.expect(TokenType::RParen)?;
            if !self.match_token(TokenType::Comma) {
                break;
            }
        }

        let returning = self.parse_returning()?;
        Ok(InsertStmt {
            table,
            columns,
            values,
            returning,
        })
    }

    /// Parse UPDATE statement
    fn parse_update(&mut self) -> Result<UpdateStmt> {
        self.expect(TokenType::Update)?;
        let table = self.parse_identifier()?;
        self.expect(TokenType::Set)?;

        let mut assignments = Vec::new();
        loop {
            let column = self.parse_identifier()?;
            self.expect(TokenType::Eq)?;
            let value = self.parse_expr(0)?;
            assignments.push((column, value));
            if !self.match_token(TokenType::Comma) {
                break;
            }
        }

        let where_clause = if self.match_token(TokenType::Where) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };

        let returning = self.parse_returning()?;
        Ok(UpdateStmt {
            table,
            assignments,
            where_clause,
            returning,
        })
    }

    /// Parse DELETE statement
    fn parse_delete(&mut self) -> Result<DeleteStmt> {
        self.expect(TokenType::Delete)?;
        self.expect(TokenType::From)?;
        let table = self.parse_identifier()?;

        let where_clause = if self.match_token(TokenType::Where) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };

        let returning = self.parse_returning()?;
        Ok(DeleteStmt {
            table,
            where_clause,
            returning,
        })
    }

    fn parse_if_not_exists(&mut self) -> Result<bool> {
        if self.match_token(TokenType::If) {
            self.expect(TokenType::Not)?;
            self.expect(TokenType::Exists)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn parse_if_exists(&mut self) -> Result<bool> {
        if self.match_token(TokenType::If) {
            self.expect(TokenType::Exists)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Parse CREATE statement
    fn parse_create(&mut self) -> Result<Statement> {
        self.expect(TokenType::Create)?;

        let or_replace = if self.match_token(TokenType::Or) {
            self.expect_keyword("replace")?;
            true
        } else {
            false
        };

        if self.match_token(TokenType::Table) {
            if or_replace {
                return Err(self.error("syntax error: OR REPLACE is not valid for tables"));
            }
            return self.parse_create_table();
        }
        if self.match_keyword("view") {
            let name = self.parse_identifier()?;
            self.expect(TokenType::As)?;
            let query = self.parse_select()?;
            return Ok(Statement::CreateView { name, or_replace, query });
        }
        if self.match_keyword("function") {
            return self.parse_create_function(or_replace);
        }
        if self.match_keyword("extension") {
            let if_not_exists = self.parse_if_not_exists()?;
            let name = self.parse_identifier()?;
            let mut version = None;
            loop {
                if self.match_keyword("version") {
                    version = Some(self.parse_string_or_identifier()?);
                } else if self.match_keyword("with") || self.match_keyword("cascade") {
                    continue;
                } else {
                    break;
                }
            }
            return Ok(Statement::CreateExtension {
                name,
                if_not_exists,
                version,
            });
        }
        if self.match_keyword("database") {
            let name = self.parse_identifier()?;
            self.skip_to_statement_end();
            return Ok(Statement::CreateDatabase { name });
        }

        Err(self.error("syntax error: expected TABLE, VIEW, FUNCTION, EXTENSION or DATABASE after CREATE"))
    }

    fn parse_create_table(&mut self) -> Result<Statement> {
        let if_not_exists = self.parse_if_not_exists()?;
        let table = self.parse_identifier()?;
        self.expect(TokenType::LParen)?;

        let mut columns = Vec::new();
        let mut primary_key = None;
        loop {
            if self.match_token(TokenType::Primary) {
                self.expect(TokenType::Key)?;
                self.expect(TokenType::LParen)?;
                primary_key = Some(self.parse_identifier()?);
                self.expect(TokenType::RParen)?;
            } else {
                columns.push(self.parse_column_spec()?);
            }
            if !self.match_token(TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RParen)?;

        Ok(Statement::CreateTable(CreateTableStmt {
            table,
            if_not_exists,
            columns,
            primary_key,
        }))
    }

    fn parse_column_spec(&mut self) -> Result<ColumnSpec> {
        let name = self.parse_identifier()?;
        let type_name = self.parse_type_name()?;
        let mut spec = ColumnSpec {
            name,
            type_name,
            not_null: false,
            primary_key: false,
        };

        loop {
            if self.match_token(TokenType::Not) {
                self.expect(TokenType::Null)?;
                spec.not_null = true;
            } else if self.match_token(TokenType::Null) {
                spec.not_null = false;
            } else if self.match_token(TokenType::Primary) {
                self.expect(TokenType::Key)?;
                spec.primary_key = true;
            } else {
                break;
            }
        }

        Ok(spec)
    }

    /// A type name: `integer`, `double precision`, `varchar(20)`.
    fn parse_type_name(&mut self) -> Result<String> {
        let mut name = self.parse_identifier()?;
        if name == "double" && self.match_keyword("precision") {
            name = "float8".to_string();
        }
        if name == "character" && self.match_keyword("varying") {
            name = "varchar".to_string();
        }
        if self.match_token(TokenType::LParen) {
            // Type modifiers are accepted and ignored
            while !matches!(self.current().token_type, TokenType::RParen | TokenType::Eof) {
                self.advance();
            }
            self.expect(TokenType::RParen)?;
        }
        Ok(name)
    }

    fn parse_create_function(&mut self, or_replace: bool) -> Result<Statement> {
        let name = self.parse_identifier()?;
        self.expect(TokenType::LParen)?;
        let mut arg_types = Vec::new();
        if !matches!(self.current().token_type, TokenType::RParen) {
            loop {
                let first = self.parse_type_name()?;
                // `name type` form: the second identifier is the type
                let ty = if matches!(self.current().token_type, TokenType::Identifier(_)) {
                    self.parse_type_name()?
                } else {
                    first
                };
                arg_types.push(ty);
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenType::RParen)?;

        self.expect_keyword("returns")?;
        let return_type = self.parse_type_name()?;

        let mut definition = Vec::new();
        let mut language = None;
        let mut strict = false;
        loop {
            if self.match_token(TokenType::As) {
                definition.push(self.parse_string()?);
                while self.match_token(TokenType::Comma) {
                    definition.push(self.parse_string()?);
                }
            } else if self.match_keyword("language") {
                language = Some(self.parse_string_or_identifier()?.to_lowercase());
            } else if self.match_keyword("strict") {
                strict = true;
            } else if self.match_keyword("returns") {
                // RETURNS NULL ON NULL INPUT
                self.expect(TokenType::Null)?;
                self.expect(TokenType::On)?;
                self.expect(TokenType::Null)?;
                self.expect_keyword("input")?;
                strict = true;
            } else if self.match_keyword("called") {
                self.expect(TokenType::On)?;
                self.expect(TokenType::Null)?;
                self.expect_keyword("input")?;
                strict = false;
            } else if self.match_keyword("immutable")
                || self.match_keyword("stable")
                || self.match_keyword("volatile")
            {
                continue;
            } else if self.match_keyword("parallel") {
                self.parse_identifier()?;
            } else {
                break;
            }
        }

        let language = language.ok_or_else(|| self.error("no language specified"))?;
        if definition.is_empty() {
            return Err(self.error("no function body specified"));
        }

        Ok(Statement::CreateFunction(CreateFunctionStmt {
            name,
            or_replace,
            arg_types,
            return_type,
            language,
            definition,
            strict,
        }))
    }

    /// Parse DROP statement
    fn parse_drop(&mut self) -> Result<Statement> {
        self.expect(TokenType::Drop)?;

        let stmt = if self.match_token(TokenType::Table) {
            let if_exists = self.parse_if_exists()?;
            Statement::DropTable {
                if_exists,
                name: self.parse_identifier()?,
            }
        } else if self.match_keyword("view") {
            let if_exists = self.parse_if_exists()?;
            Statement::DropView {
                if_exists,
                name: self.parse_identifier()?,
            }
        } else if self.match_keyword("function") {
            let if_exists = self.parse_if_exists()?;
            let name = self.parse_identifier()?;
            if self.match_token(TokenType::LParen) {
                while !matches!(self.current().token_type, TokenType::RParen | TokenType::Eof) {
                    self.advance();
                }
                self.expect(TokenType::RParen)?;
            }
            Statement::DropFunction { name, if_exists }
        } else if self.match_keyword("extension") {
            let if_exists = self.parse_if_exists()?;
            Statement::DropExtension {
                if_exists,
                name: self.parse_identifier()?,
            }
        } else {
            return Err(self.error("syntax error: expected TABLE, VIEW, FUNCTION or EXTENSION after DROP"));
        };

        // CASCADE / RESTRICT
        if !self.match_keyword("cascade") {
            self.match_keyword("restrict");
        }
        Ok(stmt)
    }

    fn parse_show(&mut self) -> Result<Statement> {
        self.expect(TokenType::Show)?;
        if self.match_token(TokenType::All) {
            return Ok(Statement::Show { name: None });
        }
        Ok(Statement::Show {
            name: Some(self.parse_identifier()?),
        })
    }

    fn parse_set(&mut self) -> Result<Statement> {
        self.expect(TokenType::Set)?;
        self.match_keyword("session");
        let name = self.parse_identifier()?;
        if !self.match_token(TokenType::Eq) {
            self.expect(TokenType::To)?;
        }
        let value = match self.current().token_type.clone() {
            TokenType::String(s) | TokenType::Number(s) | TokenType::Identifier(s) => {
                self.advance();
                s
            }
            TokenType::True | TokenType::On => {
                self.advance();
                "on".to_string()
            }
            TokenType::False => {
                self.advance();
                "off".to_string()
            }
            _ => return Err(self.error("syntax error: expected a parameter value")),
        };
        Ok(Statement::Set { name, value })
    }

    fn parse_comment(&mut self) -> Result<Statement> {
        self.expect_keyword("comment")?;
        self.expect(TokenType::On)?;
        self.expect_keyword("database")?;
        let name = self.parse_identifier()?;
        self.expect(TokenType::Is)?;
        let comment = if self.match_token(TokenType::Null) {
            None
        } else {
            Some(self.parse_string()?)
        };
        Ok(Statement::CommentOnDatabase { name, comment })
    }

    fn parse_notify(&mut self) -> Result<Statement> {
        self.expect_keyword("notify")?;
        let channel = self.parse_identifier()?;
        let payload = if self.match_token(TokenType::Comma) {
            Some(self.parse_string()?)
        } else {
            None
        };
        Ok(Statement::Notify { channel, payload })
    }

    /// Pratt parser for expressions
    fn parse_expr(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut left = self.parse_prefix_expr()?;

        loop {
            // IS [NOT] NULL binds between AND and the comparisons
            if matches!(self.current().token_type, TokenType::Is) {
                if min_precedence > 3 {
                    break;
                }
                self.advance();
                let negated = self.match_token(TokenType::Not);
                self.expect(TokenType::Null)?;
                left = Expr::IsNull {
                    expr: Box::new(left),
                    negated,
                };
                continue;
            }

            let Some(op) = self.try_parse_binary_op() else {
                break;
            };
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }

            self.advance(); // consume operator
            let right = self.parse_expr(precedence + 1)?;

            left = Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn try_parse_binary_op(&self) -> Option<BinaryOperator> {
        match self.current().token_type {
            TokenType::Or => Some(BinaryOperator::Or),
            TokenType::And => Some(BinaryOperator::And),
            TokenType::Eq => Some(BinaryOperator::Eq),
            TokenType::Ne => Some(BinaryOperator::NotEq),
            TokenType::Lt => Some(BinaryOperator::Lt),
            TokenType::Le => Some(BinaryOperator::LtEq),
            TokenType::Gt => Some(BinaryOperator::Gt),
            TokenType::Ge => Some(BinaryOperator::GtEq),
            TokenType::Concat => Some(BinaryOperator::Concat),
            TokenType::Plus => Some(BinaryOperator::Plus),
            TokenType::Minus => Some(BinaryOperator::Minus),
            TokenType::Star => Some(BinaryOperator::Multiply),
            TokenType::Slash => Some(BinaryOperator::Divide),
            TokenType::Percent => Some(BinaryOperator::Modulo),
            _ => None,
        }
    }

    fn parse_prefix_expr(&mut self) -> Result<Expr> {
        let expr = match self.current().token_type.clone() {
            TokenType::Not => {
                self.advance();
                Expr::UnaryOp {
                    op: UnaryOperator::Not,
                    expr: Box::new(self.parse_expr(3)?),
                }
            }
            TokenType::Minus => {
                self.advance();
                Expr::UnaryOp {
                    op: UnaryOperator::Minus,
                    expr: Box::new(self.parse_expr(8)?),
                }
            }
            TokenType::Plus => {
                self.advance();
                Expr::UnaryOp {
                    op: UnaryOperator::Plus,
                    expr: Box::new(self.parse_expr(8)?),
                }
            }
            _ => self.parse_primary_expr()?,
        };
        self.parse_casts(expr)
    }

    fn parse_casts(&mut self, mut expr: Expr) -> Result<Expr> {
        while self.match_token(TokenType::DoubleColon) {
            let type_name = self.parse_type_name()?;
            expr = Expr::Cast {
                expr: Box::new(expr),
                type_name,
            };
        }
        Ok(expr)
    }

    fn parse_primary_expr(&mut self) -> Result<Expr> {
        let token = self.current().token_type.clone();
        match token {
            TokenType::Number(text) => {
                self.advance();
                Ok(Expr::Literal(parse_number(&text).ok_or_else(|| self.error("invalid number"))?))
            }
            TokenType::String(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::String(s)))
            }
            TokenType::True => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(true)))
            }
            TokenType::False => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(false)))
            }
            TokenType::Null => {
                self.advance();
                Ok(Expr::Literal(Literal::Null))
            }
            TokenType::LParen => {
                self.advance();
                let expr = self.parse_expr(0)?;
                self.expect(TokenType::RParen)?;
                Ok(expr)
            }
            TokenType::Identifier(name) => {
                self.advance();
                if self.match_token(TokenType::LParen) {
                    return self.parse_function_call(name);
                }
                if self.match_token(TokenType::Dot) {
                    let column = self.parse_identifier()?;
                    return Ok(Expr::Column {
                        table: Some(name),
                        name: column,
                    });
                }
                Ok(match name.as_str() {
                    "current_user" | "current_role" | "user" => Expr::SqlValue(SqlValueFunction::CurrentUser),
                    "session_user" => Expr::SqlValue(SqlValueFunction::SessionUser),
                    "current_catalog" => Expr::SqlValue(SqlValueFunction::CurrentCatalog),
                    _ => Expr::Column { table: None, name },
                })
            }
            other => Err(self.error(&format!("syntax error at or near {:?}", other))),
        }
    }

    fn parse_function_call(&mut self, name: String) -> Result<Expr> {
        if self.match_token(TokenType::Star) {
            self.expect(TokenType::RParen)?;
            return Ok(Expr::FunctionCall {
                name,
                args: Vec::new(),
                star: true,
            });
        }
        let args = if matches!(self.current().token_type, TokenType::RParen) {
            Vec::new()
        } else {
            self.parse_expr_list()?
        };
        self.expect(TokenType::RParen)?;
        Ok(Expr::FunctionCall {
            name,
            args,
            star: false,
        })
    }

    fn parse_identifier(&mut self) -> Result<String> {
        match &self.current().token_type {
            TokenType::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("syntax error: expected identifier")),
        }
    }

    fn parse_identifier_list(&mut self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        loop {
            names.push(self.parse_identifier()?);
            if !self.match_token(TokenType::Comma) {
                break;
            }
        }
        Ok(names)
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>> {
        let mut exprs = Vec::new();
        loop {
            exprs.push(self.parse_expr(0)?);
            if !self.match_token(TokenType::Comma) {
                break;
            }
        }
        Ok(exprs)
    }

    fn parse_string(&mut self) -> Result<String> {
        match &self.current().token_type {
            TokenType::String(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            _ => Err(self.error("syntax error: expected string literal")),
        }
    }

    fn parse_string_or_identifier(&mut self) -> Result<String> {
        match &self.current().token_type {
            TokenType::String(s) | TokenType::Identifier(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            _ => Err(self.error("syntax error: expected name or string literal")),
        }
    }

    fn parse_u64(&mut self) -> Result<u64> {
        match &self.current().token_type {
            TokenType::Number(text) => {
                let value = text.parse::<u64>().map_err(|_| self.error("expected a non-negative integer"))?;
                self.advance();
                Ok(value)
            }
            _ => Err(self.error("expected a non-negative integer")),
        }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.position]
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn match_token(&mut self, token_type: TokenType) -> bool {
        if std::mem::discriminant(&self.current().token_type) == std::mem::discriminant(&token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_keyword(&mut self, keyword: &str) -> bool {
        if let TokenType::Identifier(ref id) = self.current().token_type {
            if id.eq_ignore_ascii_case(keyword) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn expect(&mut self, token_type: TokenType) -> Result<()> {
        if std::mem::discriminant(&self.current().token_type) == std::mem::discriminant(&token_type) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("syntax error: expected {:?}", token_type)))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.match_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(&format!("syntax error: expected {}", keyword.to_uppercase())))
        }
    }

    fn error(&self, msg: &str) -> BackendError {
        let token = self.current();
        BackendError::syntax(format!("{} at line {} column {}", msg, token.line, token.column))
    }
}

fn parse_number(text: &str) -> Option<Literal> {
    if text.contains(['.', 'e', 'E']) {
        text.parse::<f64>().ok().map(Literal::Float)
    } else {
        match text.parse::<i64>() {
            Ok(v) => Some(Literal::Integer(v)),
            Err(_) => text.parse::<f64>().ok().map(Literal::Float),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(sql: &str) -> Statement {
        let mut statements = parse_sql(sql).unwrap();
        assert_eq!(statements.len(), 1);
        statements.remove(0)
    }

    #[test]
    fn test_parse_simple_select() {
        match parse_one("SELECT * FROM users") {
            Statement::Select(s) => {
                assert_eq!(s.from.unwrap().name, "users");
                assert!(matches!(s.columns[0], SelectColumn::Star));
            }
            other => panic!("Expected SELECT statement, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_select_without_from() {
        match parse_one("SELECT 1 + 2 * 3 AS x") {
            Statement::Select(s) => {
                assert!(s.from.is_none());
                let SelectColumn::Expr(Expr::BinaryOp { op, right, .. }, alias) = &s.columns[0] else {
                    panic!("expected binary expression");
                };
                assert_eq!(*op, BinaryOperator::Plus);
                assert!(matches!(right.as_ref(), Expr::BinaryOp { op: BinaryOperator::Multiply, .. }));
                assert_eq!(alias.as_deref(), Some("x"));
            }
            other => panic!("Expected SELECT statement, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_select_clauses() {
        match parse_one("SELECT id, name FROM t WHERE a > 1 AND b IS NOT NULL ORDER BY id DESC, name LIMIT 5 OFFSET 2") {
            Statement::Select(s) => {
                assert_eq!(s.columns.len(), 2);
                let Some(Expr::BinaryOp { op: BinaryOperator::And, right, .. }) = &s.where_clause else {
                    panic!("expected AND");
                };
                assert!(matches!(right.as_ref(), Expr::IsNull { negated: true, .. }));
                assert_eq!(s.order_by.len(), 2);
                assert!(!s.order_by[0].asc);
                assert!(s.order_by[1].asc);
                assert_eq!(s.limit, Some(5));
                assert_eq!(s.offset, Some(2));
            }
            other => panic!("Expected SELECT statement, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_multiple_statements() {
        let statements = parse_sql("CREATE TABLE t (id INT); ; INSERT INTO t VALUES (1), (2) RETURNING id;").unwrap();
        assert_eq!(statements.len(), 2);
        match &statements[1] {
            Statement::Insert(i) => {
                assert_eq!(i.values.len(), 2);
                assert!(i.returning.is_some());
            }
            other => panic!("Expected INSERT, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_create_table() {
        match parse_one("CREATE TABLE IF NOT EXISTS t (id SERIAL PRIMARY KEY, v DOUBLE PRECISION NOT NULL, s VARCHAR(20))") {
            Statement::CreateTable(c) => {
                assert!(c.if_not_exists);
                assert_eq!(c.columns.len(), 3);
                assert!(c.columns[0].primary_key);
                assert_eq!(c.columns[1].type_name, "float8");
                assert!(c.columns[1].not_null);
                assert_eq!(c.columns[2].type_name, "varchar");
            }
            other => panic!("Expected CREATE TABLE, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_create_function() {
        let sql = "CREATE OR REPLACE FUNCTION add_one(integer) RETURNS integer \
                   AS '$libdir/example', 'add_one' LANGUAGE C STRICT IMMUTABLE";
        match parse_one(sql) {
            Statement::CreateFunction(f) => {
                assert!(f.or_replace);
                assert_eq!(f.arg_types, vec!["integer"]);
                assert_eq!(f.definition, vec!["$libdir/example", "add_one"]);
                assert_eq!(f.language, "c");
                assert!(f.strict);
            }
            other => panic!("Expected CREATE FUNCTION, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_notify_family() {
        assert_eq!(
            parse_one("NOTIFY jobs, 'hello'"),
            Statement::Notify { channel: "jobs".into(), payload: Some("hello".into()) }
        );
        assert_eq!(parse_one("LISTEN jobs"), Statement::Listen { channel: "jobs".into() });
        assert_eq!(parse_one("UNLISTEN *"), Statement::Unlisten { channel: None });
    }

    #[test]
    fn test_parse_transaction_control() {
        assert_eq!(parse_one("BEGIN"), Statement::TransactionControl(TransactionKind::Begin));
        assert_eq!(parse_one("START TRANSACTION"), Statement::TransactionControl(TransactionKind::Begin));
        assert_eq!(parse_one("END"), Statement::TransactionControl(TransactionKind::Commit));
        assert_eq!(parse_one("ROLLBACK WORK"), Statement::TransactionControl(TransactionKind::Rollback));
    }

    #[test]
    fn test_parse_cast_and_sql_value() {
        match parse_one("SELECT 1::bigint, current_user") {
            Statement::Select(s) => {
                assert!(matches!(&s.columns[0], SelectColumn::Expr(Expr::Cast { type_name, .. }, _) if type_name == "bigint"));
                assert!(matches!(&s.columns[1], SelectColumn::Expr(Expr::SqlValue(SqlValueFunction::CurrentUser), _)));
            }
            other => panic!("Expected SELECT, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors_carry_position() {
        let err = parse_sql("SELECT FROM").unwrap_err();
        assert!(err.message.contains("line 1"));
        assert!(parse_sql("SELEC 1").is_err());
        assert!(parse_sql("SELECT 1 2").is_err());
    }
}
