// System prompts, English and Chinese

use crate::types::Language;

const ROUTER_EN: &str = "You route requests for a neoantigen vaccine design assistant. \
Answer with exactly one word:\n\
- pipeline: the user wants the full neoantigen selection workflow (cleavage, TAP, MHC binding, immunogenicity, TCR, mRNA design) run on their patient data\n\
- tool: the user wants one specific prediction (e.g. only MHC binding, a structure, RNA folding, codon design)\n\
- chat: anything else, including general questions about immunology or how the assistant works";

const ROUTER_ZH: &str = "你负责为新抗原疫苗设计助手分流请求。只回答一个单词：\n\
- pipeline：用户希望对患者数据运行完整的新抗原筛选流程（酶切、TAP、MHC 结合、免疫原性、TCR、mRNA 设计）\n\
- tool：用户只需要某一项预测（例如仅 MHC 结合、结构预测、RNA 折叠、密码子设计）\n\
- chat：其他所有情况，包括免疫学常识问题或助手使用说明";

const TOOL_EN: &str = "You are NeoAgent, an assistant for neoantigen discovery. \
Use the available tools to answer the user's request. Pass object URLs (minio://...) exactly as given. \
When a tool returns a link, mention it in your answer. Be concise and precise about numbers and thresholds.";

const TOOL_ZH: &str = "你是 NeoAgent，一个新抗原发现助手。请使用可用的工具完成用户请求。\
对象地址（minio://...）必须原样传入。工具返回链接时请在回答中给出。回答要简洁，数值和阈值要准确。";

const CHAT_EN: &str = "You are NeoAgent, an assistant for personalised neoantigen vaccine design. \
You can run a six-step selection pipeline (NetChop cleavage, NetTAP transport, NetMHCpan binding, \
BigMHC immunogenicity, pMTnet TCR recognition, LinearDesign mRNA design) once the user uploads a \
mutation FASTA and gives HLA typing. Answer questions clearly and briefly.";

const CHAT_ZH: &str = "你是 NeoAgent，一个个体化新抗原疫苗设计助手。用户上传突变 FASTA 并提供 HLA 分型后，\
你可以运行六步筛选流程（NetChop 酶切、NetTAP 转运、NetMHCpan 结合、BigMHC 免疫原性、pMTnet TCR 识别、\
LinearDesign mRNA 设计）。请清晰简洁地回答问题。";

const REPORT_EN: &str = "You summarise neoantigen pipeline results for a clinician-scientist. \
Using the report below, write a short summary: how many candidates survived each filter, the top \
candidates and why they stand out, and the mRNA construct. Do not invent numbers. Keep it under 200 words.";

const REPORT_ZH: &str = "你为临床科研人员总结新抗原筛选结果。根据下面的报告写一段简短总结：\
每一步筛选后剩余的候选数量、最优候选及其突出之处、mRNA 构建体。不要编造数字。控制在 300 字以内。";

pub fn router(language: Language) -> &'static str {
    match language {
        Language::En => ROUTER_EN,
        Language::Zh => ROUTER_ZH,
    }
}

pub fn tool_call(language: Language) -> &'static str {
    match language {
        Language::En => TOOL_EN,
        Language::Zh => TOOL_ZH,
    }
}

pub fn chat(language: Language) -> &'static str {
    match language {
        Language::En => CHAT_EN,
        Language::Zh => CHAT_ZH,
    }
}

pub fn report(language: Language) -> &'static str {
    match language {
        Language::En => REPORT_EN,
        Language::Zh => REPORT_ZH,
    }
}

/// Ask the user for the inputs the pipeline still needs
pub fn missing_inputs(missing: &[&str], language: Language) -> String {
    let names: Vec<&str> = missing
        .iter()
        .map(|m| match (*m, language) {
            ("mutation_file", Language::En) => "a mutation FASTA file (upload it first)",
            ("mutation_file", Language::Zh) => "突变序列 FASTA 文件（请先上传）",
            ("hla", Language::En) => "the patient's HLA alleles (e.g. HLA-A02:01) or an HLA typing file",
            ("hla", Language::Zh) => "患者 HLA 分型（例如 HLA-A02:01）或 HLA 分型文件",
            (other, _) => other,
        })
        .collect();

    match language {
        Language::En => format!("To run the neoantigen pipeline I still need: {}.", names.join("; ")),
        Language::Zh => format!("运行新抗原筛选流程还需要：{}。", names.join("；")),
    }
}

pub fn files_context(description: &str, language: Language) -> String {
    match language {
        Language::En => format!("Patient files available in this conversation:\n{}", description),
        Language::Zh => format!("本次对话中可用的患者文件：\n{}", description),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_inputs() {
        let en = missing_inputs(&["mutation_file", "hla"], Language::En);
        assert!(en.contains("mutation FASTA"));
        assert!(en.contains("HLA alleles"));

        let zh = missing_inputs(&["hla"], Language::Zh);
        assert!(zh.starts_with("运行新抗原筛选流程还需要"));
    }
}
