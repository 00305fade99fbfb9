//! Instruction texts for the vision model, plus the default requirement list.
//!
//! Every instruction lives here so wording changes never touch the retry,
//! batching or parsing code, and so tests can inspect prompts without a
//! model. The texts are in Portuguese: the checklist targets Brazilian food
//! labelling rules (ANVISA/MAPA) and the status values the model must emit
//! are Portuguese literals.
//!
//! Callers can override the transcription prompt via
//! [`crate::config::AnalysisConfig::ocr_prompt`].

/// Verbatim transcription of a single image.
pub const OCR_PROMPT: &str = "Transcreva todo o texto visível na imagem com a maior fidelidade possível. \
Mantenha a ordem, a grafia e o espaçamento exatamente como aparecem. \
Não interprete nem resuma: apenas transcreva.";

/// System message sent with every structured request.
pub const STRUCTURED_SYSTEM_PROMPT: &str = "Responda somente com JSON válido. \
Não inclua comentários, explicações ou texto fora do JSON.";

/// Verdict phrase for "no differences" in the unified comparison.
pub const EQUAL_VERDICT: &str = "As imagens são iguais";

/// Verdict phrase for "differences found" in the unified comparison.
pub const DIFFERENT_VERDICT: &str = "As imagens são diferentes";

/// The checklist used when the caller supplies no requirements.
pub const DEFAULT_REQUIREMENTS: [&str; 13] = [
    "Identificação do Fabricante",
    "Origem",
    "Atendimento ao Consumidor (SAC)",
    "Denominação de Venda",
    "Lista de Ingredientes",
    "Conteúdo Líquido",
    "Conservação e Validade",
    "Alergênicos",
    "Glúten",
    "Lactose",
    "Transgênicos",
    "Tabela Nutricional",
    "Rotulagem Nutricional Frontal (Lupa)",
];

/// Owned copy of [`DEFAULT_REQUIREMENTS`].
pub fn default_requirements() -> Vec<String> {
    DEFAULT_REQUIREMENTS.iter().map(|r| r.to_string()).collect()
}

/// Instruction for one compliance batch.
///
/// Requirements are numbered from 1 within the batch, not within the whole
/// list. The model must return exactly one object per listed requirement and
/// use "Não Aplicável" when the label carries no evidence either way.
pub fn build_compliance_prompt(batch: &[String]) -> String {
    let list = batch
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {}", i + 1, r))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Você é especialista em conformidade de rótulos de alimentos no Brasil.
Examine a imagem do rótulo e verifique cada requisito da legislação (ANVISA/MAPA) listado abaixo.

Responda com um array JSON. Cada item deve ter exatamente três chaves:
- "requisito": o nome do requisito, como listado
- "status": "Atendido", "Não Atendido" ou "Não Aplicável"
- "justificativa": uma frase curta citando o que foi (ou não) encontrado no rótulo

O array DEVE conter um item para CADA requisito listado, na mesma ordem.
Se a imagem não trouxer informação sobre um requisito, use "Não Aplicável".

REQUISITOS:
{list}

Exemplo de item:
{{"requisito": "Glúten", "status": "Atendido", "justificativa": "A frase 'Não contém glúten' está presente e legível."}}"#
    )
}

/// Instruction for the structured difference report.
///
/// Image 1 is the reference, image 2 the new version and image 3 the diff
/// mask highlighting likely changes.
pub fn build_difference_prompt(text1: &str, text2: &str) -> String {
    format!(
        r#"Tarefa: compare a Imagem 1 (referência) com a Imagem 2 (nova versão) e decida se são idênticas.

Contexto:
- A Imagem 3 é uma máscara que destaca em vermelho as regiões com prováveis diferenças.
- Texto da Imagem 1 (OCR): """{text1}"""
- Texto da Imagem 2 (OCR): """{text2}"""

Passos:
1. Compare os textos e registre cada divergência.
2. Compare cores, fontes, layout e elementos gráficos, usando a Imagem 3 como guia. Registre cada divergência.

Responda com um objeto JSON neste formato:
{{"sao_diferentes": true ou false, "diferencas": ["Diferença textual: ...", "Diferença visual: ..."]}}
"diferencas" deve listar TODAS as diferenças encontradas e ficar vazio quando não houver nenhuma."#
    )
}

/// Instruction for the free-text unified comparison.
///
/// The answer must contain one of [`EQUAL_VERDICT`] / [`DIFFERENT_VERDICT`];
/// the boolean verdict is read back from that phrase.
pub fn build_unified_prompt(text1: &str, text2: &str) -> String {
    format!(
        r#"Você verifica se dois documentos são o mesmo.
Analise a Imagem 1 e a Imagem 2, combinando comparação de texto e comparação visual.

Texto da Imagem 1 (OCR): """{text1}"""
Texto da Imagem 2 (OCR): """{text2}"""

1. Compare os textos. Há divergências?
2. Compare as imagens. Há diferenças de layout, cores, logotipos ou outros elementos gráficos?
3. Pequenas variações de alinhamento ou de qualidade podem ser ignoradas; qualquer diferença de conteúdo (texto, números, imagens) não.

Dê o veredito final com exatamente uma destas frases: "{EQUAL_VERDICT}" ou "{DIFFERENT_VERDICT}".
Se forem diferentes, resuma de forma clara as diferenças encontradas."#
    )
}
