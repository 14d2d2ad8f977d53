use std::collections::BTreeMap;
use std::fmt::Write;

use crate::environment::Environment;
use crate::error::{Error, ErrorKind};
use crate::instructions::{Instruction, Instructions};
use crate::utils::HtmlEscape;
use crate::value::{self, Value, ValueIterator};

pub struct Loop<'instr> {
    target_name: &'instr str,
    index_name: Option<&'instr str>,
    current_value: Value,
    current_index: i64,
    iterator: ValueIterator,
}

pub enum Frame<'instr> {
    /// The isolated root context supplied by the caller.
    Root { value: Value },
    /// The mutable template scope that declarations write into.
    Locals {
        values: BTreeMap<&'instr str, Value>,
    },
    /// A loop binding the loop variable and the optional index.
    Loop(Loop<'instr>),
}

#[derive(Default)]
pub struct Stack {
    values: Vec<Value>,
}

impl Stack {
    pub fn push(&mut self, arg: Value) {
        self.values.push(arg);
    }

    pub fn pop(&mut self) -> Value {
        self.values.pop().expect("stack was empty")
    }

    pub fn peek(&self) -> &Value {
        self.values.last().expect("stack was empty")
    }
}

#[derive(Default)]
pub struct Context<'instr> {
    stack: Vec<Frame<'instr>>,
}

impl<'instr> Context<'instr> {
    /// Looks up a variable in the context.
    ///
    /// Resolution walks the frames innermost out: loop bindings shadow the
    /// template scope which shadows the root context.  `None` means the
    /// identifier resolved nowhere, which the VM reports as an undefined
    /// reference.
    pub fn lookup(&self, key: &str) -> Option<Value> {
        for frame in self.stack.iter().rev() {
            match frame {
                Frame::Root { value } => {
                    if let Ok(rv) = value.get_attr(key) {
                        if !rv.is_undefined() {
                            return Some(rv);
                        }
                    }
                }
                Frame::Locals { values } => {
                    if let Some(rv) = values.get(key) {
                        return Some(rv.clone());
                    }
                }
                Frame::Loop(Loop {
                    target_name,
                    index_name,
                    current_value,
                    current_index,
                    ..
                }) => {
                    if key == *target_name {
                        return Some(current_value.clone());
                    }
                    if *index_name == Some(key) {
                        return Some(Value::from(*current_index));
                    }
                }
            }
        }
        None
    }

    /// Stores a variable in the template scope.
    pub fn store(&mut self, key: &'instr str, value: Value) {
        for frame in self.stack.iter_mut().rev() {
            if let Frame::Locals { values } = frame {
                values.insert(key, value);
                return;
            }
        }
        panic!("no template scope frame present");
    }

    /// Pushes a new frame.
    pub fn push_frame(&mut self, frame: Frame<'instr>) {
        self.stack.push(frame);
    }

    /// Pops the topmost frame.
    pub fn pop_frame(&mut self) -> Frame<'instr> {
        self.stack.pop().expect("pop from empty context stack")
    }

    /// Returns the current innermost loop.
    pub fn current_loop(&mut self) -> &mut Loop<'instr> {
        self.stack
            .iter_mut()
            .rev()
            .filter_map(|x| match *x {
                Frame::Loop(ref mut x) => Some(x),
                _ => None,
            })
            .next()
            .expect("not inside a loop")
    }
}

/// Helps to evaluate something.
pub struct Vm<'env, 'source> {
    env: &'env Environment<'source>,
}

impl<'env, 'source> Vm<'env, 'source> {
    /// Creates a new VM.
    pub fn new(env: &'env Environment<'source>) -> Vm<'env, 'source> {
        Vm { env }
    }

    /// Evaluates the given instructions against the root context.
    pub fn eval<'instr, W: Write>(
        &self,
        instructions: &Instructions<'instr>,
        root: Value,
        template_name: &str,
        output: &mut W,
    ) -> Result<(), Error> {
        let mut context = Context::default();
        context.push_frame(Frame::Root { value: root });
        context.push_frame(Frame::Locals {
            values: BTreeMap::new(),
        });

        let mut pc = 0;
        let mut stack = Stack::default();

        macro_rules! try_ctx {
            ($expr:expr) => {
                match $expr {
                    Ok(rv) => rv,
                    Err(mut err) => {
                        if let Some(lineno) = instructions.get_line(pc) {
                            err.set_location(template_name, lineno);
                        }
                        return Err(err);
                    }
                }
            };
        }

        macro_rules! func_binop {
            ($method:ident) => {{
                let a = stack.pop();
                let b = stack.pop();
                stack.push(try_ctx!(value::$method(&b, &a)));
            }};
        }

        macro_rules! op_binop {
            ($op:tt) => {{
                let a = stack.pop();
                let b = stack.pop();
                stack.push(Value::from(b $op a));
            }};
        }

        while let Some(instr) = instructions.get(pc) {
            match instr {
                Instruction::EmitRaw(val) => {
                    write!(output, "{}", val).unwrap();
                }
                Instruction::Emit => {
                    let value = stack.pop();
                    match value.as_str() {
                        Some(s) => write!(output, "{}", HtmlEscape(s)).unwrap(),
                        None => write!(output, "{}", HtmlEscape(&value.to_string())).unwrap(),
                    }
                }
                Instruction::EmitUnescaped => {
                    let value = stack.pop();
                    write!(output, "{}", value).unwrap();
                }
                Instruction::StoreLocal(name) => {
                    let value = stack.pop();
                    context.store(*name, value);
                }
                Instruction::Lookup(name) => match context.lookup(name) {
                    Some(value) => stack.push(value),
                    None => {
                        try_ctx!(Err(Error::new(
                            ErrorKind::UndefinedReference,
                            format!("{} is not defined", name),
                        )));
                    }
                },
                Instruction::GetAttr(name) => {
                    let value = stack.pop();
                    stack.push(try_ctx!(value.get_attr(name)));
                }
                Instruction::GetItem => {
                    let attr = stack.pop();
                    let value = stack.pop();
                    stack.push(try_ctx!(value.get_item(&attr)));
                }
                Instruction::LoadConst(value) => {
                    stack.push(value.clone());
                }
                Instruction::BuildList(count) => {
                    let mut v = Vec::new();
                    for _ in 0..*count {
                        v.push(stack.pop());
                    }
                    v.reverse();
                    stack.push(v.into());
                }
                Instruction::BuildMap(pair_count) => {
                    let mut map = BTreeMap::new();
                    for _ in 0..*pair_count {
                        let value = stack.pop();
                        let key = stack.pop();
                        let key = match key.as_str() {
                            Some(key) => key.to_string(),
                            None => key.to_string(),
                        };
                        map.insert(key, value);
                    }
                    stack.push(Value::from(map));
                }
                Instruction::Add => func_binop!(add),
                Instruction::Sub => func_binop!(sub),
                Instruction::Mul => func_binop!(mul),
                Instruction::Div => func_binop!(div),
                Instruction::Rem => func_binop!(rem),
                Instruction::Eq => op_binop!(==),
                Instruction::Ne => op_binop!(!=),
                Instruction::Gt => op_binop!(>),
                Instruction::Gte => op_binop!(>=),
                Instruction::Lt => op_binop!(<),
                Instruction::Lte => op_binop!(<=),
                Instruction::Not => {
                    let a = stack.pop();
                    stack.push(Value::from(!a.is_true()));
                }
                Instruction::Neg => {
                    let a = stack.pop();
                    stack.push(try_ctx!(value::neg(&a)));
                }
                Instruction::DiscardTop => {
                    stack.pop();
                }
                Instruction::PushLoop {
                    target,
                    index,
                    over_keys,
                } => {
                    let iterable = stack.pop();
                    let iterator = try_ctx!(iterable.iter_values(*over_keys));
                    context.push_frame(Frame::Loop(Loop {
                        target_name: *target,
                        index_name: *index,
                        current_value: Value::UNDEFINED,
                        current_index: -1,
                        iterator,
                    }));
                }
                Instruction::Iterate(jump_target) => {
                    let l = context.current_loop();
                    l.current_index += 1;
                    l.current_value = match l.iterator.next() {
                        Some(item) => item,
                        None => {
                            pc = *jump_target;
                            continue;
                        }
                    };
                }
                Instruction::PopFrame => {
                    context.pop_frame();
                }
                Instruction::Jump(jump_target) => {
                    pc = *jump_target;
                    continue;
                }
                Instruction::JumpIfFalse(jump_target) => {
                    let value = stack.pop();
                    if !value.is_true() {
                        pc = *jump_target;
                        continue;
                    }
                }
                Instruction::JumpIfFalseOrPop(jump_target) => {
                    if !stack.peek().is_true() {
                        pc = *jump_target;
                    } else {
                        stack.pop();
                    }
                }
                Instruction::JumpIfTrueOrPop(jump_target) => {
                    if stack.peek().is_true() {
                        pc = *jump_target;
                    } else {
                        stack.pop();
                    }
                }
                Instruction::CallFunction(function_name) => {
                    let args = try_ctx!(stack.pop().try_into_vec());
                    // print is resolved by the VM itself so that it can
                    // reach the output stream
                    if *function_name == "print" {
                        for arg in args {
                            write!(output, "{}", arg).unwrap();
                        }
                        stack.push(Value::UNDEFINED);
                    } else {
                        stack.push(try_ctx!(self.env.call_function(function_name, args)));
                    }
                }
                Instruction::CallMethod(name) => {
                    let args = try_ctx!(stack.pop().try_into_vec());
                    let obj = stack.pop();
                    stack.push(try_ctx!(call_method(&obj, name, args)));
                }
                Instruction::Nop => {}
            }
            pc += 1;
        }

        Ok(())
    }
}

/// Invokes one of the fixed safe methods on a value.
fn call_method(obj: &Value, name: &str, args: Vec<Value>) -> Result<Value, Error> {
    match name {
        "toUpperCase" => with_str(obj, name, |s| Value::from(s.to_uppercase())),
        "toLowerCase" => with_str(obj, name, |s| Value::from(s.to_lowercase())),
        "trim" => with_str(obj, name, |s| Value::from(s.trim())),
        "join" => {
            let items = obj.clone().try_into_vec().map_err(|_| method_error(obj, name))?;
            let sep = match args.first() {
                Some(sep) if !sep.is_undefined() && !sep.is_null() => sep.to_string(),
                _ => ",".to_string(),
            };
            let mut rv = String::new();
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    rv.push_str(&sep);
                }
                write!(rv, "{}", item).ok();
            }
            Ok(Value::from(rv))
        }
        "includes" => {
            let needle = args.into_iter().next().unwrap_or(Value::UNDEFINED);
            if let Some(s) = obj.as_str() {
                let needle = needle.to_string();
                Ok(Value::from(s.contains(&needle)))
            } else {
                let items = obj.clone().try_into_vec().map_err(|_| method_error(obj, name))?;
                Ok(Value::from(items.contains(&needle)))
            }
        }
        "indexOf" => {
            let needle = args.into_iter().next().unwrap_or(Value::UNDEFINED);
            if let Some(s) = obj.as_str() {
                let needle = needle.to_string();
                let rv = match s.find(&needle) {
                    Some(pos) => s[..pos].chars().count() as i64,
                    None => -1,
                };
                Ok(Value::from(rv))
            } else {
                let items = obj.clone().try_into_vec().map_err(|_| method_error(obj, name))?;
                let rv = items
                    .iter()
                    .position(|item| *item == needle)
                    .map(|pos| pos as i64)
                    .unwrap_or(-1);
                Ok(Value::from(rv))
            }
        }
        "forEach" => Err(Error::new(
            ErrorKind::InvalidOperation,
            "forEach can only be used as a statement with a callback body",
        )),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("object has no method named {}", name),
        )),
    }
}

fn with_str(obj: &Value, name: &str, f: impl FnOnce(&str) -> Value) -> Result<Value, Error> {
    match obj.as_str() {
        Some(s) => Ok(f(s)),
        None => Err(method_error(obj, name)),
    }
}

fn method_error(obj: &Value, name: &str) -> Error {
    Error::new(
        ErrorKind::InvalidOperation,
        format!("cannot call method {} on {:?} value", name, obj.kind()),
    )
}
