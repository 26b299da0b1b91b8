//! Gate-level structural Verilog: a reader that builds a module into the
//! design database and a writer that emits it back out. Reading a written
//! netlist reproduces the same instance and net sets.
//!
//! Scope: scalar ports and nets, named port connections, escaped
//! identifiers. Behavioral constructs are outside the flow and rejected.

use crate::database::{
    Design, Instance, InstanceKind, Module, ModuleKey, Net, PinDirection, PinInfo,
};
use anyhow::{anyhow, bail, Context, Result};
use itertools::Itertools;
use std::collections::HashMap;
use std::io::Write;

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Symbol(char),
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '/' => {
                chars.next();
                match chars.next() {
                    Some('/') => {
                        for c in chars.by_ref() {
                            if c == '\n' {
                                break;
                            }
                        }
                    }
                    Some('*') => {
                        let mut prev = '\0';
                        loop {
                            match chars.next() {
                                Some('/') if prev == '*' => break,
                                Some(c) => prev = c,
                                None => bail!("unterminated block comment"),
                            }
                        }
                    }
                    other => bail!("unexpected character after '/': {:?}", other),
                }
            }
            '\\' => {
                // Escaped identifier: everything up to the next whitespace.
                chars.next();
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() {
                        break;
                    }
                    name.push(c);
                    chars.next();
                }
                tokens.push(Token::Ident(name));
            }
            '(' | ')' | ',' | ';' | '.' => {
                tokens.push(Token::Symbol(c));
                chars.next();
            }
            c if c.is_alphanumeric() || c == '_' || c == '$' => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '$' || c == '[' || c == ']' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(name));
            }
            other => bail!("unexpected character {:?} in netlist", other),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Default)]
struct ModuleAst {
    name: String,
    ports: Vec<String>,
    directions: HashMap<String, PinDirection>,
    wires: Vec<String>,
    instances: Vec<InstanceAst>,
}

#[derive(Debug, Default)]
struct InstanceAst {
    cell: String,
    name: String,
    connections: Vec<(String, String)>,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| anyhow!("unexpected end of netlist"))?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect_symbol(&mut self, sym: char) -> Result<()> {
        match self.next()? {
            Token::Symbol(c) if c == sym => Ok(()),
            other => bail!("expected {:?}, found {:?}", sym, other),
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.next()? {
            Token::Ident(name) => Ok(name),
            other => bail!("expected identifier, found {:?}", other),
        }
    }

    fn parse_module(&mut self) -> Result<ModuleAst> {
        let keyword = self.ident()?;
        if keyword != "module" {
            bail!("expected 'module', found {:?}", keyword);
        }

        let mut ast = ModuleAst {
            name: self.ident()?,
            ..Default::default()
        };

        if self.peek() == Some(&Token::Symbol('(')) {
            self.expect_symbol('(')?;
            while self.peek() != Some(&Token::Symbol(')')) {
                ast.ports.push(self.ident()?);
                if self.peek() == Some(&Token::Symbol(',')) {
                    self.next()?;
                }
            }
            self.expect_symbol(')')?;
        }
        self.expect_symbol(';')?;

        loop {
            let keyword = self.ident()?;
            match keyword.as_str() {
                "endmodule" => break,
                "input" | "output" | "inout" => {
                    let direction = match keyword.as_str() {
                        "input" => PinDirection::Input,
                        "output" => PinDirection::Output,
                        _ => PinDirection::InOut,
                    };
                    loop {
                        let name = self.ident()?;
                        ast.directions.insert(name, direction);
                        match self.next()? {
                            Token::Symbol(',') => continue,
                            Token::Symbol(';') => break,
                            other => bail!("unexpected {:?} in port declaration", other),
                        }
                    }
                }
                "wire" => loop {
                    ast.wires.push(self.ident()?);
                    match self.next()? {
                        Token::Symbol(',') => continue,
                        Token::Symbol(';') => break,
                        other => bail!("unexpected {:?} in wire declaration", other),
                    }
                },
                cell => {
                    let mut inst = InstanceAst {
                        cell: cell.to_owned(),
                        name: self.ident()?,
                        ..Default::default()
                    };
                    self.expect_symbol('(')?;
                    while self.peek() != Some(&Token::Symbol(')')) {
                        self.expect_symbol('.')?;
                        let pin = self.ident()?;
                        self.expect_symbol('(')?;
                        let net = self.ident()?;
                        self.expect_symbol(')')?;
                        inst.connections.push((pin, net));
                        if self.peek() == Some(&Token::Symbol(',')) {
                            self.next()?;
                        }
                    }
                    self.expect_symbol(')')?;
                    self.expect_symbol(';')?;
                    ast.instances.push(inst);
                }
            }
        }

        Ok(ast)
    }
}

/// Parse one gate-level module and install it in the design. Cell
/// archetypes must already exist in the cell library.
pub fn read_module(design: &mut Design, src: &str) -> Result<ModuleKey> {
    let tokens = tokenize(src)?;
    let ast = Parser { tokens, pos: 0 }.parse_module()?;

    let mut module = Module::new(&ast.name);

    // Ports become nets plus fixed-pin placeholder instances.
    for port in &ast.ports {
        let direction = *ast
            .directions
            .get(port)
            .ok_or_else(|| anyhow!("port {:?} has no direction declaration", port))?;
        let port_key = module
            .ports
            .insert(
                port,
                PinInfo {
                    name: port.clone(),
                    direction,
                    ..Default::default()
                },
            )
            .ok_or_else(|| anyhow!("duplicate port {:?}", port))?;

        let net = module.netlist.add_net(Net::new(port))?;
        let inst = module
            .netlist
            .add_instance(Instance::new(port, InstanceKind::Pin(port_key)))?;
        module.netlist.connect(inst, port_key, net)?;
    }

    for wire in &ast.wires {
        if module.netlist.nets.lookup(wire).is_none() {
            module.netlist.add_net(Net::new(wire))?;
        }
    }

    for inst_ast in &ast.instances {
        let cell_key = design
            .cells
            .lookup(&inst_ast.cell)
            .ok_or_else(|| anyhow!("unknown cell {:?} for instance {:?}", inst_ast.cell, inst_ast.name))?;
        let inst = module
            .netlist
            .add_instance(Instance::new(&inst_ast.name, InstanceKind::Cell(cell_key)))
            .with_context(|| format!("adding instance {:?}", inst_ast.name))?;

        for (pin_name, net_name) in &inst_ast.connections {
            let pin = design
                .cells
                .get(cell_key)
                .expect("cell vanished during read")
                .pin_by_name(pin_name)
                .ok_or_else(|| {
                    anyhow!("cell {:?} has no pin {:?}", inst_ast.cell, pin_name)
                })?;
            let net = match module.netlist.nets.lookup(net_name) {
                Some(net) => net,
                None => module.netlist.add_net(Net::new(net_name))?,
            };
            module.netlist.connect(inst, pin, net)?;
        }
    }

    module.netlist.check_connectivity()?;
    design
        .modules
        .insert(&ast.name, module)
        .ok_or_else(|| anyhow!("module {:?} already exists", ast.name))
}

/// Emit a module as structural Verilog.
pub fn write_module(design: &Design, module: &Module, w: &mut impl Write) -> Result<()> {
    let ports: Vec<&PinInfo> = module.ports.iter().map(|(_, p)| p).collect();
    writeln!(
        w,
        "module {} ({});",
        module.name,
        ports.iter().map(|p| p.name.as_str()).join(", ")
    )?;
    for port in &ports {
        let keyword = match port.direction {
            PinDirection::Input => "input",
            PinDirection::Output => "output",
            _ => "inout",
        };
        writeln!(w, "  {} {};", keyword, port.name)?;
    }
    writeln!(w)?;

    for (_, net) in module.netlist.nets.iter() {
        if module.ports.lookup(&net.name).is_none() {
            writeln!(w, "  wire {};", net.name)?;
        }
    }
    writeln!(w)?;

    for (_, inst) in module.netlist.instances.iter() {
        let cell_key = match inst.kind {
            InstanceKind::Cell(cell) => cell,
            // Pin placeholders are implied by the port list.
            InstanceKind::Pin(_) | InstanceKind::Module(_) => continue,
        };
        let cell = design
            .cells
            .get(cell_key)
            .ok_or_else(|| anyhow!("instance {:?} references a dead cell", inst.name))?;

        let connections = inst
            .pin_nets
            .iter()
            .map(|(&pin, &net)| -> Result<(String, String)> {
                let pin_name = cell
                    .pins
                    .get(pin)
                    .ok_or_else(|| anyhow!("instance {:?} references a dead pin", inst.name))?
                    .name
                    .clone();
                let net_name = module
                    .netlist
                    .nets
                    .get(net)
                    .ok_or_else(|| anyhow!("instance {:?} references a dead net", inst.name))?
                    .name
                    .clone();
                Ok((pin_name, net_name))
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .sorted()
            .map(|(pin, net)| format!(".{}({})", pin, net))
            .join(", ");

        writeln!(w, "  {} {} ({});", cell.name, inst.name, connections)?;
    }

    writeln!(w, "endmodule")?;
    Ok(())
}
