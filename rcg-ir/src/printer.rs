//! Textual IR
//!
//! Renders a module in LLVM-style assembly. Unnamed parameters and
//! instruction results are numbered per function in program order.

use std::collections::HashMap;
use std::fmt::{self, Write};
use crate::values::ValueKind;
use crate::{Function, InstKind, Linkage, Module, Type, Value};

/// Display adapter returned by [`Module::display`]
pub struct ModuleDisplay<'m> {
    module: &'m Module,
}

/// Display adapter returned by [`Module::display_function`]
pub struct FunctionDisplay<'m> {
    module: &'m Module,
    function: Function,
}

impl Module {
    pub fn display(&self) -> ModuleDisplay<'_> {
        ModuleDisplay { module: self }
    }

    pub fn display_function(&self, function: Function) -> FunctionDisplay<'_> {
        FunctionDisplay { module: self, function }
    }
}

/// Local names of one function
struct Slots<'m> {
    module: &'m Module,
    names: HashMap<Value, String>,
}

impl<'m> Slots<'m> {
    fn new(module: &'m Module, function: Option<Function>) -> Self {
        let mut names = HashMap::new();
        if let Some(function) = function {
            let mut next = 0usize;
            let mut assign = |value: Value| {
                let name = match module.name_of(value) {
                    Some(name) => name.to_string(),
                    None => {
                        next += 1;
                        (next - 1).to_string()
                    }
                };
                names.insert(value, name);
            };
            for &param in module.params(function) {
                assign(param);
            }
            for block in module.blocks(function) {
                for inst in module.instructions(block) {
                    if !module.types.is_void(module.type_of(inst)) {
                        assign(inst);
                    }
                }
            }
        }
        Self { module, names }
    }

    fn ty(&self, ty: Type) -> String {
        self.module.types.display(ty).to_string()
    }

    /// Operand without its type
    fn operand(&self, value: Value) -> String {
        let module = self.module;
        let data = module.value(value);
        match data.kind() {
            ValueKind::ConstInt(_) => {
                let signed = module.const_int_signed(value).unwrap_or(0);
                if module.types.int_width(data.ty()) == Some(1) {
                    (signed != 0).to_string()
                } else {
                    signed.to_string()
                }
            }
            ValueKind::ConstFloat(v) => format!("{v:?}"),
            ValueKind::ConstNull => "null".to_string(),
            ValueKind::Undef => "undef".to_string(),
            ValueKind::ConstAggregate(elements) => {
                let inner = elements
                    .iter()
                    .map(|&e| self.typed(e))
                    .collect::<Vec<_>>()
                    .join(", ");
                match module.types.kind(data.ty()) {
                    crate::TypeKind::Vector => format!("<{inner}>"),
                    crate::TypeKind::Struct if module.types.is_packed(data.ty()) => format!("<{{ {inner} }}>"),
                    crate::TypeKind::Struct => format!("{{ {inner} }}"),
                    _ => format!("[{inner}]"),
                }
            }
            ValueKind::ConstString(bytes) => {
                let mut text = String::from("c\"");
                for &byte in bytes {
                    if (byte.is_ascii_graphic() && byte != b'"' && byte != b'\\') || byte == b' ' {
                        text.push(byte as char);
                    } else {
                        let _ = write!(text, "\\{byte:02X}");
                    }
                }
                text.push('"');
                text
            }
            ValueKind::Global(_) => format!("@{}", data.name().unwrap_or("<anon>")),
            ValueKind::Argument { .. } | ValueKind::Instruction(_) => match self.names.get(&value) {
                Some(name) => format!("%{name}"),
                None => format!("%<{}>", value.index()),
            },
        }
    }

    /// Operand preceded by its type
    fn typed(&self, value: Value) -> String {
        format!("{} {}", self.ty(self.module.type_of(value)), self.operand(value))
    }

    fn label(&self, block: crate::Block) -> String {
        format!("label %{}", self.module.block_label(block))
    }

    fn instruction(&self, inst: Value, kind: &InstKind) -> String {
        let module = self.module;
        let result_ty = module.type_of(inst);
        let body = match kind {
            InstKind::Binary { op, lhs, rhs } => {
                format!("{op} {}, {}", self.typed(*lhs), self.operand(*rhs))
            }
            InstKind::ICmp { pred, lhs, rhs } => {
                format!("icmp {pred} {}, {}", self.typed(*lhs), self.operand(*rhs))
            }
            InstKind::FCmp { pred, lhs, rhs } => {
                format!("fcmp {pred} {}, {}", self.typed(*lhs), self.operand(*rhs))
            }
            InstKind::Alloca { allocated, count } => match count {
                Some(count) => format!("alloca {}, {}", self.ty(*allocated), self.typed(*count)),
                None => format!("alloca {}", self.ty(*allocated)),
            },
            InstKind::Load { ptr } => format!("load {}, {}", self.ty(result_ty), self.typed(*ptr)),
            InstKind::Store { value, ptr } => format!("store {}, {}", self.typed(*value), self.typed(*ptr)),
            InstKind::GetElementPtr { base, indices } => {
                let pointee = module
                    .types
                    .element_type(module.type_of(*base))
                    .map(|ty| self.ty(ty))
                    .unwrap_or_default();
                let mut text = format!("getelementptr {pointee}, {}", self.typed(*base));
                for &index in indices {
                    text.push_str(", ");
                    text.push_str(&self.typed(index));
                }
                text
            }
            InstKind::Branch { dest } => format!("br {}", self.label(*dest)),
            InstKind::CondBranch { cond, then_dest, else_dest } => format!(
                "br {}, {}, {}",
                self.typed(*cond),
                self.label(*then_dest),
                self.label(*else_dest)
            ),
            InstKind::Switch { value, default, cases } => {
                let mut text = format!("switch {}, {} [", self.typed(*value), self.label(*default));
                for (key, dest) in cases {
                    let _ = write!(text, "\n    {}, {}", self.typed(*key), self.label(*dest));
                }
                text.push_str("\n  ]");
                text
            }
            InstKind::Phi { incoming } => {
                let arms = incoming
                    .iter()
                    .map(|(block, value)| {
                        format!("[ {}, %{} ]", self.operand(*value), module.block_label(*block))
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("phi {} {arms}", self.ty(result_ty))
            }
            InstKind::Call { callee, args } => {
                let args = args.iter().map(|&a| self.typed(a)).collect::<Vec<_>>().join(", ");
                format!("call {} @{}({args})", self.ty(result_ty), module.function_name(*callee))
            }
            InstKind::Return(Some(value)) => format!("ret {}", self.typed(*value)),
            InstKind::Return(None) => "ret void".to_string(),
            InstKind::Unreachable => "unreachable".to_string(),
            InstKind::Cast { op, value } => {
                format!("{op} {} to {}", self.typed(*value), self.ty(result_ty))
            }
            InstKind::ExtractValue { aggregate, index } => {
                format!("extractvalue {}, {index}", self.typed(*aggregate))
            }
            InstKind::InsertValue { aggregate, element, index } => {
                format!("insertvalue {}, {}, {index}", self.typed(*aggregate), self.typed(*element))
            }
            InstKind::ExtractElement { vector, index } => {
                format!("extractelement {}, {}", self.typed(*vector), self.typed(*index))
            }
            InstKind::InsertElement { vector, element, index } => format!(
                "insertelement {}, {}, {}",
                self.typed(*vector),
                self.typed(*element),
                self.typed(*index)
            ),
            InstKind::ShuffleVector { lhs, rhs, mask } => format!(
                "shufflevector {}, {}, {}",
                self.typed(*lhs),
                self.typed(*rhs),
                self.typed(*mask)
            ),
            InstKind::Select { cond, then_value, else_value } => format!(
                "select {}, {}, {}",
                self.typed(*cond),
                self.typed(*then_value),
                self.typed(*else_value)
            ),
        };
        if module.types.is_void(result_ty) {
            body
        } else {
            format!("{} = {body}", self.operand(inst))
        }
    }
}

fn linkage_prefix(linkage: Linkage) -> String {
    match linkage {
        Linkage::External => String::new(),
        other => format!("{other} "),
    }
}

impl fmt::Display for FunctionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let module = self.module;
        let function = self.function;
        let slots = Slots::new(module, Some(function));
        let mut params: Vec<String> = module
            .params(function)
            .iter()
            .map(|&p| {
                if module.is_declaration(function) {
                    slots.ty(module.type_of(p))
                } else {
                    slots.typed(p)
                }
            })
            .collect();
        if module.is_var_arg(function) {
            params.push("...".to_string());
        }
        let header = format!(
            "{}{} @{}({})",
            linkage_prefix(module.linkage(function)),
            slots.ty(module.return_type(function)),
            module.function_name(function),
            params.join(", ")
        );

        if module.is_declaration(function) {
            return writeln!(f, "declare {header}");
        }
        writeln!(f, "define {header} {{")?;
        for (i, block) in module.blocks(function).enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}:", module.block_label(block))?;
            for inst in module.instructions(block) {
                if let Some(kind) = module.instruction(inst) {
                    writeln!(f, "  {}", slots.instruction(inst, kind))?;
                }
            }
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for ModuleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let module = self.module;
        writeln!(f, "; ModuleID = '{}'", module.name())?;

        let named: Vec<Type> = module.types.named_structs().collect();
        if !named.is_empty() {
            writeln!(f)?;
        }
        for ty in named {
            writeln!(
                f,
                "{} = type {}",
                module.types.display(ty),
                module.types.display_struct_body(ty)
            )?;
        }

        let slots = Slots::new(module, None);
        let globals: Vec<Value> = module.globals().collect();
        if !globals.is_empty() {
            writeln!(f)?;
        }
        for global in globals {
            let Ok(data) = module.global_data(global) else { continue };
            let kind = if data.is_constant() { "constant" } else { "global" };
            let value_ty = slots.ty(data.value_type());
            match data.initializer() {
                Some(init) => writeln!(
                    f,
                    "{} = {}{kind} {value_ty} {}",
                    slots.operand(global),
                    linkage_prefix(data.linkage()),
                    slots.operand(init)
                )?,
                None => writeln!(f, "{} = external {kind} {value_ty}", slots.operand(global))?,
            }
        }

        for function in module.functions() {
            writeln!(f)?;
            write!(f, "{}", module.display_function(function))?;
        }
        Ok(())
    }
}
